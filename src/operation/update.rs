use bson::{doc, Bson, Document};
use serde::Deserialize;

use crate::{
    coll::Namespace,
    conn::{Command, CommandResponse},
    error::Result,
    operation::{Operation, WriteResponseBody},
    results::UpdateResult,
};

#[derive(Debug)]
pub(crate) struct Update {
    ns: Namespace,
    filter: Document,
    update: Document,
    multi: bool,
    upsert: Option<bool>,
}

impl Update {
    pub(crate) fn new(
        ns: Namespace,
        filter: Document,
        update: Document,
        multi: bool,
        upsert: Option<bool>,
    ) -> Self {
        Self {
            ns,
            filter,
            update,
            multi,
            upsert,
        }
    }
}

impl Operation for Update {
    type O = UpdateResult;
    const NAME: &'static str = "update";

    fn build(&self) -> Result<Command> {
        let mut statement = doc! {
            "q": self.filter.clone(),
            "u": self.update.clone(),
        };
        if self.multi {
            statement.insert("multi", true);
        }
        if let Some(upsert) = self.upsert {
            statement.insert("upsert", upsert);
        }

        let body = doc! {
            Self::NAME: self.ns.coll.clone(),
            "updates": [statement],
            "ordered": true,
        };

        Ok(Command::new(Self::NAME, self.ns.db.clone(), body))
    }

    fn handle_response(&self, response: CommandResponse) -> Result<Self::O> {
        response.validate()?;

        let body: WriteResponseBody<UpdateBody> = response.body()?;
        body.validate()?;

        let upserted_id = body
            .body
            .upserted
            .as_ref()
            .and_then(|upserted| upserted.first())
            .map(|upserted| upserted.id.clone());

        Ok(UpdateResult {
            matched_count: body.n,
            modified_count: body.body.n_modified,
            upserted_id,
        })
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct UpdateBody {
    #[serde(rename = "nModified", default)]
    n_modified: i64,

    upserted: Option<Vec<Upserted>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Upserted {
    #[serde(rename = "_id")]
    id: Bson,
}

#[cfg(test)]
mod tests {
    use bson::{doc, Bson};

    use super::{Operation, Update};
    use crate::{coll::Namespace, conn::CommandResponse};

    #[test]
    fn build_shapes_the_update_statement() {
        let update = Update::new(
            Namespace::new("db", "coll"),
            doc! { "x": 1 },
            doc! { "$set": { "x": 2 } },
            true,
            Some(true),
        );

        let command = update.build().unwrap();
        assert_eq!(
            command.body,
            doc! {
                "update": "coll",
                "updates": [{
                    "q": { "x": 1 },
                    "u": { "$set": { "x": 2 } },
                    "multi": true,
                    "upsert": true,
                }],
                "ordered": true,
            }
        );
    }

    #[test]
    fn reply_counts_are_extracted() {
        let update = Update::new(
            Namespace::new("db", "coll"),
            doc! {},
            doc! { "$set": { "x": 2 } },
            false,
            None,
        );

        let response = CommandResponse::with_document(doc! {
            "ok": 1,
            "n": 3_i32,
            "nModified": 2_i32,
        });

        let result = update.handle_response(response).unwrap();
        assert_eq!(result.matched_count, 3);
        assert_eq!(result.modified_count, 2);
        assert!(result.upserted_id.is_none());
    }

    #[test]
    fn upserted_id_is_surfaced() {
        let update = Update::new(
            Namespace::new("db", "coll"),
            doc! { "x": 1 },
            doc! { "$set": { "x": 2 } },
            false,
            Some(true),
        );

        let response = CommandResponse::with_document(doc! {
            "ok": 1,
            "n": 1,
            "nModified": 0,
            "upserted": [{ "index": 0, "_id": 99 }],
        });

        let result = update.handle_response(response).unwrap();
        assert_eq!(result.upserted_id, Some(Bson::Int32(99)));
    }
}
