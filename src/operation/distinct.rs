use bson::{doc, Bson, Document};

use crate::{
    coll::Namespace,
    command_responses::DistinctCommandResponse,
    conn::{Command, CommandResponse},
    error::Result,
    operation::Operation,
};

#[derive(Debug)]
pub(crate) struct Distinct {
    ns: Namespace,
    field_name: String,
    query: Option<Document>,
}

impl Distinct {
    pub(crate) fn new(ns: Namespace, field_name: String, query: Option<Document>) -> Self {
        Self {
            ns,
            field_name,
            query,
        }
    }
}

impl Operation for Distinct {
    type O = Vec<Bson>;
    const NAME: &'static str = "distinct";

    fn build(&self) -> Result<Command> {
        let mut body = doc! {
            Self::NAME: self.ns.coll.clone(),
            "key": self.field_name.clone(),
        };

        if let Some(ref query) = self.query {
            body.insert("query", query.clone());
        }

        Ok(Command::new(Self::NAME, self.ns.db.clone(), body))
    }

    fn handle_response(&self, response: CommandResponse) -> Result<Self::O> {
        let body: DistinctCommandResponse = response.body()?;
        Ok(body.values)
    }
}
