use bson::{doc, Document};

use crate::{
    bson_util,
    coll::Namespace,
    conn::{Command, CommandResponse},
    error::{Error, Result},
    operation::Operation,
};

#[derive(Debug)]
pub(crate) struct Count {
    ns: Namespace,
    query: Option<Document>,
}

impl Count {
    pub(crate) fn new(ns: Namespace, query: Option<Document>) -> Self {
        Self { ns, query }
    }
}

impl Operation for Count {
    type O = i64;
    const NAME: &'static str = "count";

    fn build(&self) -> Result<Command> {
        let mut body = doc! {
            Self::NAME: self.ns.coll.clone(),
        };

        if let Some(ref query) = self.query {
            body.insert("query", query.clone());
        }

        Ok(Command::new(Self::NAME, self.ns.db.clone(), body))
    }

    fn handle_response(&self, response: CommandResponse) -> Result<Self::O> {
        response.validate()?;

        response
            .raw_response
            .get("n")
            .and_then(bson_util::get_int)
            .ok_or_else(|| {
                Error::protocol("the server's count reply did not contain a numeric `n`")
            })
    }
}
