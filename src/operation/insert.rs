use std::collections::HashMap;

use bson::{doc, Bson, Document};

use crate::{
    coll::Namespace,
    conn::{Command, CommandResponse},
    error::{Error, Result},
    operation::{Operation, WriteResponseBody},
    options::InsertManyOptions,
    results::InsertManyResult,
};

#[derive(Debug)]
pub(crate) struct Insert {
    ns: Namespace,
    documents: Vec<Document>,
    inserted_ids: HashMap<usize, Bson>,
    options: Option<InsertManyOptions>,
}

impl Insert {
    /// Creates an insert operation. Documents without an `_id` get one assigned from
    /// `generate_id` up front, so the caller can report the ids that were written.
    pub(crate) fn new(
        ns: Namespace,
        documents: Vec<Document>,
        options: Option<InsertManyOptions>,
        mut generate_id: impl FnMut() -> bson::oid::ObjectId,
    ) -> Result<Self> {
        if documents.is_empty() {
            return Err(Error::invalid_argument(
                "at least one document must be given to insert",
            ));
        }

        let mut inserted_ids = HashMap::new();
        let documents: Vec<Document> = documents
            .into_iter()
            .enumerate()
            .map(|(index, mut document)| {
                let id = match document.get("_id") {
                    Some(id) => id.clone(),
                    None => {
                        let id = Bson::ObjectId(generate_id());
                        document.insert("_id", id.clone());
                        id
                    }
                };
                inserted_ids.insert(index, id);
                document
            })
            .collect();

        Ok(Self {
            ns,
            documents,
            inserted_ids,
            options,
        })
    }
}

impl Operation for Insert {
    type O = InsertManyResult;
    const NAME: &'static str = "insert";

    fn build(&self) -> Result<Command> {
        let ordered = self
            .options
            .as_ref()
            .and_then(|options| options.ordered)
            .unwrap_or(true);

        let body = doc! {
            Self::NAME: self.ns.coll.clone(),
            "ordered": ordered,
        };

        Ok(Command::new(Self::NAME, self.ns.db.clone(), body)
            .with_document_sequence("documents", self.documents.clone()))
    }

    fn handle_response(&self, response: CommandResponse) -> Result<Self::O> {
        response.validate()?;

        let body: WriteResponseBody = response.body()?;
        body.validate()?;

        Ok(InsertManyResult {
            inserted_ids: self.inserted_ids.clone(),
        })
    }
}
