//! Contains the types needed to specify options to database operations.
//!
//! The options structs in this module use the
//! [`typed-builder`](https://crates.io/crates/typed-builder) crate to derive a type-safe
//! builder API. For example, to create an instance of `FindOptions` with only `limit` and
//! `batch_size` set, the builder API can be used as follows:
//!
//! ```rust
//! use mongowire::options::FindOptions;
//!
//! let options = FindOptions::builder()
//!     .limit(20)
//!     .batch_size(5)
//!     .build();
//! ```

use std::{fmt, time::Duration};

use bson::Document;
use serde::Serialize;
use typed_builder::TypedBuilder;

use crate::{auth::Credential, bson_util};

/// The address of a MongoDB server.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StreamAddress {
    /// The hostname of the address.
    pub hostname: String,

    /// The port of the address. The default port 27017 is used if none is given.
    pub port: Option<u16>,
}

impl StreamAddress {
    pub fn new(hostname: impl Into<String>, port: impl Into<Option<u16>>) -> Self {
        Self {
            hostname: hostname.into(),
            port: port.into(),
        }
    }

    pub(crate) fn port_or_default(&self) -> u16 {
        self.port.unwrap_or(27017)
    }
}

impl fmt::Display for StreamAddress {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "{}:{}", self.hostname, self.port_or_default())
    }
}

/// Options used to configure a `Connection`.
#[derive(Clone, Debug, Default, TypedBuilder)]
pub struct ConnectionOptions {
    /// The credential to authenticate with once the connection is established. If `None`, the
    /// connection is handed over unauthenticated.
    #[builder(default, setter(strip_option))]
    pub credential: Option<Credential>,

    /// How long to wait for the TCP connection to be established before giving up.
    #[builder(default, setter(strip_option))]
    pub connect_timeout: Option<Duration>,
}

/// Specifies the options to a `Collection::find` operation.
#[derive(Clone, Debug, Default, Serialize, TypedBuilder)]
#[serde(rename_all = "camelCase")]
pub struct FindOptions {
    /// The maximum number of documents to return. A value of 0 means there is no limit.
    #[builder(default, setter(strip_option))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<i64>,

    /// The number of documents to skip before counting.
    #[builder(default, setter(strip_option))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip: Option<i64>,

    /// The order of the documents for the purposes of the operation.
    #[builder(default, setter(strip_option))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort: Option<Document>,

    /// Limits the fields of the document being returned.
    #[builder(default, setter(strip_option))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub projection: Option<Document>,

    /// The number of documents the server should return per cursor batch.
    #[builder(default, setter(strip_option))]
    #[serde(
        serialize_with = "bson_util::serialize_u32_as_i32",
        skip_serializing_if = "Option::is_none"
    )]
    pub batch_size: Option<u32>,

    /// Tags the query with an arbitrary string to help trace the operation through the
    /// database profiler, currentOp, and logs.
    #[builder(default, setter(strip_option, into))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

/// Specifies the options to a `Collection::insert_many` operation.
#[derive(Clone, Debug, Default, TypedBuilder)]
pub struct InsertManyOptions {
    /// Whether the server should stop processing the batch at the first failed statement.
    /// Defaults to true.
    #[builder(default, setter(strip_option))]
    pub ordered: Option<bool>,
}

/// Specifies the options to a `Collection::update_one` or `Collection::update_many`
/// operation.
#[derive(Clone, Debug, Default, TypedBuilder)]
pub struct UpdateOptions {
    /// Insert a document if no matching document is found.
    #[builder(default, setter(strip_option))]
    pub upsert: Option<bool>,
}

/// Specifies the options to a `Collection::replace_one` operation.
#[derive(Clone, Debug, Default, TypedBuilder)]
pub struct ReplaceOptions {
    /// Insert a document if no matching document is found.
    #[builder(default, setter(strip_option))]
    pub upsert: Option<bool>,
}

/// Specifies the options to a `Collection::aggregate` operation.
#[derive(Clone, Debug, Default, TypedBuilder)]
pub struct AggregateOptions {
    /// The number of documents the server should return per cursor batch.
    #[builder(default, setter(strip_option))]
    pub batch_size: Option<u32>,

    /// Tags the pipeline with an arbitrary string.
    #[builder(default, setter(strip_option, into))]
    pub comment: Option<String>,
}

/// Specifies the options to a `Database::list_collections` operation.
#[derive(Clone, Debug, Default, TypedBuilder)]
pub struct ListCollectionsOptions {
    /// The number of collection-info documents the server should return per cursor batch.
    #[builder(default, setter(strip_option))]
    pub batch_size: Option<u32>,
}

#[cfg(test)]
mod tests {
    use bson::doc;

    use super::{FindOptions, StreamAddress};

    #[test]
    fn stream_address_display_uses_default_port() {
        assert_eq!(
            StreamAddress::new("localhost", None).to_string(),
            "localhost:27017"
        );
        assert_eq!(
            StreamAddress::new("db.example.com", 27018).to_string(),
            "db.example.com:27018"
        );
    }

    #[test]
    fn find_options_serialize_to_camel_case() {
        let options = FindOptions::builder().limit(20).batch_size(5).build();
        let doc = bson::to_document(&options).unwrap();

        assert_eq!(doc, doc! { "limit": 20_i64, "batchSize": 5_i32 });
    }
}
