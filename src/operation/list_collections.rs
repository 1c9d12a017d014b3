use bson::{doc, Document};

use crate::{
    coll::Namespace,
    conn::{Command, CommandResponse},
    cursor::CursorSpecification,
    error::Result,
    operation::{CursorBody, Operation},
    options::ListCollectionsOptions,
};

#[derive(Debug)]
pub(crate) struct ListCollections {
    db: String,
    filter: Option<Document>,
    name_only: bool,
    options: Option<ListCollectionsOptions>,
}

impl ListCollections {
    pub(crate) fn new(
        db: String,
        filter: Option<Document>,
        name_only: bool,
        options: Option<ListCollectionsOptions>,
    ) -> Self {
        Self {
            db,
            filter,
            name_only,
            options,
        }
    }
}

impl Operation for ListCollections {
    type O = CursorSpecification;
    const NAME: &'static str = "listCollections";

    fn build(&self) -> Result<Command> {
        let mut cursor = Document::new();
        if let Some(batch_size) = self.options.as_ref().and_then(|opts| opts.batch_size) {
            cursor.insert("batchSize", batch_size as i32);
        }

        let mut body = doc! {
            Self::NAME: 1,
            "cursor": cursor,
        };

        if let Some(ref filter) = self.filter {
            body.insert("filter", filter.clone());
        }

        // Only ask for names alone when no filter needs the full info documents.
        if self.name_only && self.filter.is_none() {
            body.insert("nameOnly", true);
        }

        Ok(Command::new(Self::NAME, self.db.clone(), body))
    }

    fn handle_response(&self, response: CommandResponse) -> Result<Self::O> {
        let body: CursorBody = response.body()?;
        let fallback = Namespace::new(self.db.clone(), "$cmd.listCollections");

        Ok(CursorSpecification::new(
            body.cursor.namespace(&fallback),
            body.cursor.id,
            body.cursor.batch,
            self.options.as_ref().and_then(|opts| opts.batch_size),
            None,
        ))
    }
}
