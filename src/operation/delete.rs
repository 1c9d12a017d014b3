use bson::{doc, Document};

use crate::{
    coll::Namespace,
    conn::{Command, CommandResponse},
    error::Result,
    operation::{Operation, WriteResponseBody},
    results::DeleteResult,
};

#[derive(Debug)]
pub(crate) struct Delete {
    ns: Namespace,
    filter: Document,
    /// The maximum number of documents to delete; 0 deletes everything that matches.
    limit: i32,
}

impl Delete {
    pub(crate) fn new(ns: Namespace, filter: Document, limit: i32) -> Self {
        Self { ns, filter, limit }
    }
}

impl Operation for Delete {
    type O = DeleteResult;
    const NAME: &'static str = "delete";

    fn build(&self) -> Result<Command> {
        let body = doc! {
            Self::NAME: self.ns.coll.clone(),
            "deletes": [{
                "q": self.filter.clone(),
                "limit": self.limit,
            }],
            "ordered": true,
        };

        Ok(Command::new(Self::NAME, self.ns.db.clone(), body))
    }

    fn handle_response(&self, response: CommandResponse) -> Result<Self::O> {
        response.validate()?;

        let body: WriteResponseBody = response.body()?;
        body.validate()?;

        Ok(DeleteResult {
            deleted_count: body.n,
        })
    }
}

#[cfg(test)]
mod tests {
    use bson::doc;

    use super::{Delete, Operation};
    use crate::{coll::Namespace, conn::CommandResponse};

    #[test]
    fn build_shapes_the_delete_statement() {
        let delete = Delete::new(Namespace::new("db", "coll"), doc! { "x": 1 }, 1);
        let command = delete.build().unwrap();

        assert_eq!(
            command.body,
            doc! {
                "delete": "coll",
                "deletes": [{ "q": { "x": 1 }, "limit": 1_i32 }],
                "ordered": true,
            }
        );
    }

    #[test]
    fn deleted_count_is_extracted() {
        let delete = Delete::new(Namespace::new("db", "coll"), doc! {}, 0);
        let response = CommandResponse::with_document(doc! { "ok": 1, "n": 7 });

        let result = delete.handle_response(response).unwrap();
        assert_eq!(result.deleted_count, 7);
    }
}
