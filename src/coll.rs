use std::{fmt, str::FromStr, sync::Arc};

use bson::{Bson, Document};
use serde::{de::Error as DeError, Deserialize, Deserializer, Serialize};

use crate::{
    bson_util,
    cursor::Cursor,
    db::Database,
    error::{Error, Result},
    operation::{Aggregate, Count, Delete, Distinct, Find, Insert, Update},
    options::{
        AggregateOptions, FindOptions, InsertManyOptions, ReplaceOptions, UpdateOptions,
    },
    results::{DeleteResult, InsertManyResult, InsertOneResult, UpdateResult},
};

/// `Collection` is the client-side abstraction of a MongoDB collection. It can be used
/// to perform collection-level operations such as CRUD operations. A `Collection` can be
/// obtained through a [`Database`](struct.Database.html) by calling
/// [`Database::collection`](struct.Database.html#method.collection).
///
/// `Collection` uses [`std::sync::Arc`](https://doc.rust-lang.org/std/sync/struct.Arc.html)
/// internally, so it can safely be shared across threads or async tasks.
#[derive(Clone, Debug)]
pub struct Collection {
    inner: Arc<CollectionInner>,
}

#[derive(Debug)]
struct CollectionInner {
    db: Database,
    name: String,
}

impl Collection {
    pub(crate) fn new(db: Database, name: &str) -> Self {
        Self {
            inner: Arc::new(CollectionInner {
                db,
                name: name.to_string(),
            }),
        }
    }

    fn database(&self) -> &Database {
        &self.inner.db
    }

    /// Gets the name of the `Collection`.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Gets the namespace of the `Collection`, i.e. `"<db>.<coll>"`.
    pub fn namespace(&self) -> Namespace {
        Namespace {
            db: self.database().name().to_string(),
            coll: self.name().to_string(),
        }
    }

    /// Finds the documents in the collection matching `filter`.
    pub async fn find(
        &self,
        filter: Option<Document>,
        options: Option<FindOptions>,
    ) -> Result<Cursor> {
        let operation = Find::new(
            self.namespace(),
            filter.unwrap_or_default(),
            options,
        );
        let conn = self.database().connection();
        let spec = conn.execute(operation).await?;
        Ok(Cursor::new(conn.clone(), spec))
    }

    /// Finds a single document in the collection matching `filter`. Implemented as a
    /// limit-1 `find`, so no second round trip is ever made.
    pub async fn find_one(
        &self,
        filter: Option<Document>,
        options: Option<FindOptions>,
    ) -> Result<Option<Document>> {
        let mut options = options.unwrap_or_default();
        options.limit = Some(1);

        let cursor = self.find(filter, Some(options)).await?;
        Ok(cursor.drain().await?.into_iter().next())
    }

    /// Runs an aggregation framework pipeline over the collection.
    pub async fn aggregate(
        &self,
        pipeline: Vec<Document>,
        options: Option<AggregateOptions>,
    ) -> Result<Cursor> {
        let operation = Aggregate::new(self.namespace(), pipeline, options);
        let conn = self.database().connection();
        let spec = conn.execute(operation).await?;
        Ok(Cursor::new(conn.clone(), spec))
    }

    /// Counts the documents matching `filter`.
    pub async fn count(&self, filter: Option<Document>) -> Result<i64> {
        let operation = Count::new(self.namespace(), filter);
        self.database().connection().execute(operation).await
    }

    /// Finds the distinct values of the field `field_name` across the documents matching
    /// `filter`.
    pub async fn distinct(
        &self,
        field_name: &str,
        filter: Option<Document>,
    ) -> Result<Vec<Bson>> {
        let operation = Distinct::new(self.namespace(), field_name.to_string(), filter);
        self.database().connection().execute(operation).await
    }

    /// Inserts `doc` into the collection.
    pub async fn insert_one(&self, doc: Document) -> Result<InsertOneResult> {
        let result = self.insert_many(vec![doc], None).await?;
        let inserted_id = result
            .inserted_ids
            .get(&0)
            .cloned()
            .ok_or_else(|| Error::protocol("insert reply did not cover the document"))?;

        Ok(InsertOneResult { inserted_id })
    }

    /// Inserts the documents into the collection. Documents without an `_id` field get
    /// one generated from the connection's `ObjectId` generator.
    pub async fn insert_many(
        &self,
        docs: Vec<Document>,
        options: Option<InsertManyOptions>,
    ) -> Result<InsertManyResult> {
        let conn = self.database().connection().clone();
        let operation = Insert::new(self.namespace(), docs, options, || {
            conn.generate_object_id()
        })?;
        self.database().connection().execute(operation).await
    }

    /// Updates the first document matching `query` with `update`, which must only
    /// contain update operators.
    pub async fn update_one(
        &self,
        query: Document,
        update: Document,
        options: Option<UpdateOptions>,
    ) -> Result<UpdateResult> {
        bson_util::update_document_check(&update)?;
        let operation = Update::new(
            self.namespace(),
            query,
            update,
            false,
            options.and_then(|opts| opts.upsert),
        );
        self.database().connection().execute(operation).await
    }

    /// Updates every document matching `query` with `update`, which must only contain
    /// update operators.
    pub async fn update_many(
        &self,
        query: Document,
        update: Document,
        options: Option<UpdateOptions>,
    ) -> Result<UpdateResult> {
        bson_util::update_document_check(&update)?;
        let operation = Update::new(
            self.namespace(),
            query,
            update,
            true,
            options.and_then(|opts| opts.upsert),
        );
        self.database().connection().execute(operation).await
    }

    /// Replaces the first document matching `query` with `replacement`, which must not
    /// contain update operators.
    pub async fn replace_one(
        &self,
        query: Document,
        replacement: Document,
        options: Option<ReplaceOptions>,
    ) -> Result<UpdateResult> {
        bson_util::replacement_document_check(&replacement)?;
        let operation = Update::new(
            self.namespace(),
            query,
            replacement,
            false,
            options.and_then(|opts| opts.upsert),
        );
        self.database().connection().execute(operation).await
    }

    /// Deletes the first document matching `query`.
    pub async fn delete_one(&self, query: Document) -> Result<DeleteResult> {
        let operation = Delete::new(self.namespace(), query, 1);
        self.database().connection().execute(operation).await
    }

    /// Deletes every document matching `query`.
    pub async fn delete_many(&self, query: Document) -> Result<DeleteResult> {
        let operation = Delete::new(self.namespace(), query, 0);
        self.database().connection().execute(operation).await
    }
}

/// A struct modeling the canonical name for a collection in MongoDB.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Namespace {
    /// The name of the database associated with this namespace.
    pub db: String,

    /// The name of the collection this namespace corresponds to.
    pub coll: String,
}

impl Namespace {
    /// Construct a `Namespace` with the given database and collection.
    pub fn new(db: impl Into<String>, coll: impl Into<String>) -> Self {
        Self {
            db: db.into(),
            coll: coll.into(),
        }
    }

    pub(crate) fn from_str(s: &str) -> Option<Self> {
        let mut parts = s.split('.');

        let db = parts.next();
        let coll = parts.collect::<Vec<_>>().join(".");

        match (db, coll) {
            (Some(db), coll) if !coll.is_empty() => Some(Self {
                db: db.to_string(),
                coll,
            }),
            _ => None,
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "{}.{}", self.db, self.coll)
    }
}

impl FromStr for Namespace {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_str(s).ok_or_else(|| {
            Error::invalid_argument("a namespace must be of the form <db>.<collection>")
        })
    }
}

impl<'de> Deserialize<'de> for Namespace {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s: String = Deserialize::deserialize(deserializer)?;
        Self::from_str(&s)
            .ok_or_else(|| D::Error::custom("missing one or more fields in namespace"))
    }
}

impl Serialize for Namespace {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&format!("{}.{}", self.db, self.coll))
    }
}

#[cfg(test)]
mod tests {
    use super::Namespace;

    #[test]
    fn namespace_renders_as_db_dot_coll() {
        assert_eq!(Namespace::new("db", "coll").to_string(), "db.coll");
    }

    #[test]
    fn namespace_parsing_keeps_dotted_collections() {
        let ns = Namespace::from_str("db.$cmd.listCollections").unwrap();
        assert_eq!(ns.db, "db");
        assert_eq!(ns.coll, "$cmd.listCollections");

        assert!(Namespace::from_str("nodot").is_none());
    }
}
