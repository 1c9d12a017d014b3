//! Contains the types of results returned by CRUD operations.

use std::collections::HashMap;

use bson::Bson;

/// The result of a `Collection::insert_one` operation.
#[derive(Clone, Debug)]
pub struct InsertOneResult {
    /// The `_id` field of the document inserted.
    pub inserted_id: Bson,
}

/// The result of a `Collection::insert_many` operation.
#[derive(Clone, Debug)]
pub struct InsertManyResult {
    /// The `_id` field of the documents inserted, keyed by their index in the batch.
    pub inserted_ids: HashMap<usize, Bson>,
}

/// The result of a `Collection::update_one`, `Collection::update_many`, or
/// `Collection::replace_one` operation.
#[derive(Clone, Debug)]
pub struct UpdateResult {
    /// The number of documents that matched the filter.
    pub matched_count: i64,

    /// The number of documents that were modified by the operation.
    pub modified_count: i64,

    /// The `_id` field of the upserted document, if an upsert took place.
    pub upserted_id: Option<Bson>,
}

/// The result of a `Collection::delete_one` or `Collection::delete_many` operation.
#[derive(Clone, Debug)]
pub struct DeleteResult {
    /// The number of documents deleted by the operation.
    pub deleted_count: i64,
}

/// The result of an internal `getMore` operation, i.e. one batch of a cursor.
#[derive(Clone, Debug)]
pub(crate) struct GetMoreResult {
    pub(crate) batch: Vec<bson::Document>,
    pub(crate) exhausted: bool,
}
