use bson::doc;

use crate::{
    coll::Namespace,
    conn::{Command, CommandResponse},
    error::{Error, ErrorKind, Result},
    operation::{CursorBody, Operation},
    results::GetMoreResult,
};

/// The server error code reported when a `getMore` targets a cursor id the server no
/// longer knows about.
const CURSOR_NOT_FOUND: i32 = 43;

#[derive(Debug)]
pub(crate) struct GetMore {
    ns: Namespace,
    cursor_id: i64,
    batch_size: Option<u32>,
}

impl GetMore {
    pub(crate) fn new(ns: Namespace, cursor_id: i64, batch_size: Option<u32>) -> Self {
        Self {
            ns,
            cursor_id,
            batch_size,
        }
    }
}

impl Operation for GetMore {
    type O = GetMoreResult;
    const NAME: &'static str = "getMore";

    fn build(&self) -> Result<Command> {
        let mut body = doc! {
            Self::NAME: self.cursor_id,
            "collection": self.ns.coll.clone(),
        };

        if let Some(batch_size) = self.batch_size {
            if batch_size > i32::MAX as u32 {
                return Err(Error::invalid_argument(
                    "the batch size must fit into a signed 32-bit integer",
                ));
            }
            if batch_size > 0 {
                body.insert("batchSize", batch_size as i32);
            }
        }

        Ok(Command::new(Self::NAME, self.ns.db.clone(), body))
    }

    fn handle_response(&self, response: CommandResponse) -> Result<Self::O> {
        let body: CursorBody = response.body().map_err(|err| {
            let cursor_gone = matches!(
                *err.kind,
                ErrorKind::Command(ref e) if e.code == CURSOR_NOT_FOUND
            );
            if cursor_gone {
                Error::new(ErrorKind::CursorClosed)
            } else {
                err
            }
        })?;

        Ok(GetMoreResult {
            exhausted: body.cursor.id == 0,
            batch: body.cursor.batch,
        })
    }
}
