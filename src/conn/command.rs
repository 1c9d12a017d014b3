use bson::{Bson, Document};
use serde::de::DeserializeOwned;

use crate::{
    bson_util,
    error::{CommandError, Error, ErrorKind, Result},
    wire::DocumentSequence,
};

/// `Command` is a driver side abstraction of a server command containing all the
/// information necessary to serialize it to a wire message.
#[derive(Debug, Clone)]
pub struct Command {
    pub name: String,
    pub target_db: String,
    pub body: Document,
    pub(crate) document_sequences: Vec<DocumentSequence>,
}

impl Command {
    /// Constructs a new command.
    pub fn new(name: impl Into<String>, target_db: impl Into<String>, body: Document) -> Self {
        Self {
            name: name.into(),
            target_db: target_db.into(),
            body,
            document_sequences: Vec::new(),
        }
    }

    /// Attaches a document sequence, transmitted as an OP_MSG payload type 1 section.
    /// On the legacy OP_QUERY path the sequence is folded back into the body.
    pub(crate) fn with_document_sequence(
        mut self,
        identifier: impl Into<String>,
        documents: Vec<Document>,
    ) -> Self {
        self.document_sequences.push(DocumentSequence {
            identifier: identifier.into(),
            documents,
        });
        self
    }

    /// The single-document rendering of this command, with document sequences folded in
    /// as arrays. Used for the legacy wire path.
    pub(crate) fn body_with_sequences(&self) -> Document {
        let mut body = self.body.clone();
        for sequence in &self.document_sequences {
            body.insert(
                sequence.identifier.clone(),
                bson_util::to_bson_array(&sequence.documents),
            );
        }
        body
    }
}

/// A reply to a command, as read off the wire.
#[derive(Debug, Clone)]
pub struct CommandResponse {
    pub raw_response: Document,
}

impl CommandResponse {
    pub(crate) fn new(raw_response: Document) -> Self {
        Self { raw_response }
    }

    /// Initialize a response from a document.
    #[cfg(test)]
    pub(crate) fn with_document(doc: Document) -> Self {
        Self { raw_response: doc }
    }

    /// Returns whether this response indicates a success (i.e. "ok: 1").
    pub fn is_success(&self) -> bool {
        match self.raw_response.get("ok") {
            Some(b) => bson_util::get_int(b) == Some(1),
            None => false,
        }
    }

    /// Returns a result indicating whether this response corresponds to a command
    /// failure.
    pub fn validate(&self) -> Result<()> {
        if self.is_success() {
            return Ok(());
        }

        let command_error: CommandError =
            bson::from_bson(Bson::Document(self.raw_response.clone())).map_err(|_| {
                Error::protocol("the server returned an invalid reply document")
            })?;
        Err(Error::new(ErrorKind::Command(command_error)))
    }

    /// Deserializes the body of the response. If this response corresponds to a command
    /// failure, the appropriate `Command` error is returned instead.
    pub fn body<T: DeserializeOwned>(&self) -> Result<T> {
        self.validate()?;
        bson::from_bson(Bson::Document(self.raw_response.clone())).map_err(|e| {
            Error::protocol(format!("the server returned an invalid reply document: {}", e))
        })
    }
}
