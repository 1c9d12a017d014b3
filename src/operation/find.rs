use bson::{doc, Document};

use crate::{
    coll::Namespace,
    conn::{Command, CommandResponse},
    cursor::CursorSpecification,
    error::{Error, Result},
    operation::{append_options, CursorBody, Operation},
    options::FindOptions,
};

#[derive(Debug)]
pub(crate) struct Find {
    ns: Namespace,
    filter: Document,
    options: Option<FindOptions>,
}

impl Find {
    pub(crate) fn new(ns: Namespace, filter: Document, options: Option<FindOptions>) -> Self {
        Self {
            ns,
            filter,
            options,
        }
    }
}

impl Operation for Find {
    type O = CursorSpecification;
    const NAME: &'static str = "find";

    fn build(&self) -> Result<Command> {
        let mut body = doc! {
            Self::NAME: self.ns.coll.clone(),
        };

        if let Some(ref options) = self.options {
            if options.batch_size.map(|batch_size| batch_size > i32::MAX as u32) == Some(true) {
                return Err(Error::invalid_argument(
                    "the batch size must fit into a signed 32-bit integer",
                ));
            }
            if options.limit.map(|limit| limit < 0) == Some(true) {
                return Err(Error::invalid_argument("the limit must be non-negative"));
            }
        }

        append_options(&mut body, self.options.as_ref())?;
        body.insert("filter", self.filter.clone());

        Ok(Command::new(Self::NAME, self.ns.db.clone(), body))
    }

    fn handle_response(&self, response: CommandResponse) -> Result<Self::O> {
        let body: CursorBody = response.body()?;

        Ok(CursorSpecification::new(
            body.cursor.namespace(&self.ns),
            body.cursor.id,
            body.cursor.batch,
            self.options.as_ref().and_then(|opts| opts.batch_size),
            self.options.as_ref().and_then(|opts| opts.limit),
        ))
    }
}

#[cfg(test)]
mod tests {
    use bson::doc;

    use super::{Find, Operation};
    use crate::{coll::Namespace, conn::CommandResponse, options::FindOptions};

    #[test]
    fn build_includes_options_and_filter() {
        let options = FindOptions::builder()
            .limit(5)
            .batch_size(2)
            .sort(doc! { "x": 1 })
            .build();
        let find = Find::new(
            Namespace::new("db", "coll"),
            doc! { "x": { "$gt": 1 } },
            Some(options),
        );

        let command = find.build().unwrap();
        assert_eq!(command.target_db, "db");
        assert_eq!(
            command.body,
            doc! {
                "find": "coll",
                "limit": 5_i64,
                "sort": { "x": 1 },
                "batchSize": 2_i32,
                "filter": { "x": { "$gt": 1 } },
            }
        );
    }

    #[test]
    fn response_becomes_a_cursor_specification() {
        let find = Find::new(Namespace::new("db", "coll"), doc! {}, None);
        let response = CommandResponse::with_document(doc! {
            "cursor": {
                "id": 42_i64,
                "ns": "db.coll",
                "firstBatch": [{ "x": 1 }, { "x": 2 }],
            },
            "ok": 1,
        });

        let spec = find.handle_response(response).unwrap();
        assert_eq!(spec.id, 42);
        assert_eq!(spec.ns, Namespace::new("db", "coll"));
        assert_eq!(spec.initial_batch.len(), 2);
    }

    #[test]
    fn negative_limit_is_rejected() {
        let options = FindOptions::builder().limit(-1).build();
        let find = Find::new(Namespace::new("db", "coll"), doc! {}, Some(options));
        assert!(find.build().is_err());
    }
}
