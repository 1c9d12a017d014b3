//! Typed wrappers over the server's command surface. Each operation builds a single
//! command document and interprets the reply.

mod aggregate;
mod count;
mod create_user;
mod delete;
mod distinct;
mod find;
mod get_more;
mod insert;
mod is_master;
mod kill_cursors;
mod list_collections;
mod update;
mod users_info;

use bson::{self, Bson, Document};
use serde::{Deserialize, Serialize};

use crate::{
    coll::Namespace,
    conn::{Command, CommandResponse},
    error::{Error, ErrorKind, Result, WriteConcernError, WriteError, WriteFailure},
};

pub(crate) use aggregate::Aggregate;
pub(crate) use count::Count;
pub(crate) use create_user::CreateUser;
pub(crate) use delete::Delete;
pub(crate) use distinct::Distinct;
pub(crate) use find::Find;
pub(crate) use get_more::GetMore;
pub(crate) use insert::Insert;
pub(crate) use is_master::IsMaster;
pub(crate) use kill_cursors::KillCursors;
pub(crate) use list_collections::ListCollections;
pub(crate) use update::Update;
pub(crate) use users_info::UsersInfo;

/// A trait modeling the behavior of a server side operation.
pub(crate) trait Operation {
    /// The output type of this operation.
    type O;

    /// The name of the server side command associated with this operation.
    const NAME: &'static str;

    /// Returns the command that should be sent to the server as part of this operation.
    fn build(&self) -> Result<Command>;

    /// Interprets the server response to the command.
    fn handle_response(&self, response: CommandResponse) -> Result<Self::O>;
}

/// Appends a serializable struct to the input document.
/// The serializable struct MUST serialize to a Document, otherwise an error will be
/// returned.
pub(crate) fn append_options<T: Serialize>(doc: &mut Document, options: Option<&T>) -> Result<()> {
    match options {
        Some(options) => {
            let temp_doc = bson::to_bson(options)?;
            match temp_doc {
                Bson::Document(d) => {
                    doc.extend(d);
                    Ok(())
                }
                _ => Err(Error::protocol(
                    "options did not serialize to a document",
                )),
            }
        }
        None => Ok(()),
    }
}

/// The cursor sub-document of `find`, `aggregate`, `listCollections`, and `getMore`
/// replies.
#[derive(Debug, Deserialize)]
pub(crate) struct CursorBody {
    pub(crate) cursor: CursorInfo,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CursorInfo {
    pub(crate) id: i64,

    pub(crate) ns: String,

    #[serde(default, alias = "firstBatch", alias = "nextBatch")]
    pub(crate) batch: Vec<Document>,
}

impl CursorInfo {
    /// The namespace the server reports for the cursor, falling back to `fallback` if it
    /// cannot be parsed.
    pub(crate) fn namespace(&self, fallback: &Namespace) -> Namespace {
        Namespace::from_str(&self.ns).unwrap_or_else(|| fallback.clone())
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct EmptyBody {}

/// The shared shape of `insert`/`update`/`delete` replies. A reply with `ok: 1` can
/// still carry per-statement or write-concern failures, which fail the operation.
#[derive(Debug, Deserialize)]
pub(crate) struct WriteResponseBody<T = EmptyBody> {
    #[serde(flatten)]
    pub(crate) body: T,

    #[serde(default)]
    pub(crate) n: i64,

    #[serde(rename = "writeErrors")]
    pub(crate) write_errors: Option<Vec<WriteError>>,

    #[serde(rename = "writeConcernError")]
    pub(crate) write_concern_error: Option<WriteConcernError>,
}

impl<T> WriteResponseBody<T> {
    pub(crate) fn validate(&self) -> Result<()> {
        if let Some(ref write_errors) = self.write_errors {
            if let Some(first) = write_errors.first() {
                return Err(Error::new(ErrorKind::Write(WriteFailure::WriteError(
                    first.clone(),
                ))));
            }
        }

        if let Some(ref write_concern_error) = self.write_concern_error {
            return Err(Error::new(ErrorKind::Write(
                WriteFailure::WriteConcernError(write_concern_error.clone()),
            )));
        }

        Ok(())
    }
}
