use bson::{doc, Bson, Document};

use crate::{
    coll::Namespace,
    conn::{Command, CommandResponse},
    cursor::CursorSpecification,
    error::Result,
    operation::{CursorBody, Operation},
    options::AggregateOptions,
};

#[derive(Debug)]
pub(crate) struct Aggregate {
    ns: Namespace,
    pipeline: Vec<Document>,
    options: Option<AggregateOptions>,
}

impl Aggregate {
    pub(crate) fn new(
        ns: Namespace,
        pipeline: Vec<Document>,
        options: Option<AggregateOptions>,
    ) -> Self {
        Self {
            ns,
            pipeline,
            options,
        }
    }
}

impl Operation for Aggregate {
    type O = CursorSpecification;
    const NAME: &'static str = "aggregate";

    fn build(&self) -> Result<Command> {
        let pipeline: Vec<Bson> = self
            .pipeline
            .iter()
            .map(|stage| Bson::Document(stage.clone()))
            .collect();

        let mut cursor = Document::new();
        if let Some(batch_size) = self.options.as_ref().and_then(|opts| opts.batch_size) {
            cursor.insert("batchSize", batch_size as i32);
        }

        let mut body = doc! {
            Self::NAME: self.ns.coll.clone(),
            "pipeline": pipeline,
            "cursor": cursor,
        };

        if let Some(comment) = self.options.as_ref().and_then(|opts| opts.comment.clone()) {
            body.insert("comment", comment);
        }

        Ok(Command::new(Self::NAME, self.ns.db.clone(), body))
    }

    fn handle_response(&self, response: CommandResponse) -> Result<Self::O> {
        let body: CursorBody = response.body()?;

        Ok(CursorSpecification::new(
            body.cursor.namespace(&self.ns),
            body.cursor.id,
            body.cursor.batch,
            self.options.as_ref().and_then(|opts| opts.batch_size),
            None,
        ))
    }
}
