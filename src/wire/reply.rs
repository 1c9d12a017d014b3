use std::io::Cursor;

use bitflags::bitflags;
use bson::Document;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use super::{read_document, Header, OpCode};
use crate::error::{Error, ErrorKind, Result};

bitflags! {
    pub struct ResponseFlags: i32 {
        const CURSOR_NOT_FOUND = 0b00000001;
        const QUERY_FAILURE    = 0b00000010;
        const AWAIT_CAPABLE    = 0b00001000;
    }
}

/// Represents a legacy OP_REPLY wire protocol operation.
#[derive(Debug)]
pub struct Reply {
    pub header: Header,
    pub response_flags: ResponseFlags,
    pub cursor_id: i64,
    pub starting_from: i32,
    pub num_returned: i32,
    pub documents: Vec<Document>,
}

impl Reply {
    /// Creates a single-document reply addressed to `response_to`. Only servers send
    /// these; the client side of this codec uses it in tests.
    pub fn new_command_reply(request_id: i32, response_to: i32, document: Document) -> Self {
        Self {
            header: Header {
                length: 0,
                request_id,
                response_to,
                op_code: OpCode::Reply,
            },
            response_flags: ResponseFlags::empty(),
            cursor_id: 0,
            starting_from: 0,
            num_returned: 1,
            documents: vec![document],
        }
    }

    /// Parses the body of an OP_REPLY frame.
    pub fn parse(header: Header, body: &[u8]) -> Result<Self> {
        let mut reader = Cursor::new(body);

        let response_flags = ResponseFlags::from_bits_truncate(reader.read_i32::<LittleEndian>()?);
        let cursor_id = reader.read_i64::<LittleEndian>()?;
        let starting_from = reader.read_i32::<LittleEndian>()?;
        let num_returned = reader.read_i32::<LittleEndian>()?;

        let mut documents = Vec::new();
        while (reader.position() as usize) < body.len() {
            documents.push(read_document(&mut reader)?);
        }

        if reader.position() as usize != body.len() {
            return Err(Error::protocol(format!(
                "OP_REPLY body claimed {} bytes but {} were read",
                body.len(),
                reader.position()
            )));
        }

        Ok(Self {
            header,
            response_flags,
            cursor_id,
            starting_from,
            num_returned,
            documents,
        })
    }

    /// Serializes the reply, writing the complete frame to `buf` and patching the
    /// `messageLength` field in place.
    pub fn write_to(&self, buf: &mut Vec<u8>) -> Result<()> {
        let start = buf.len();

        self.header.write_to(buf)?;
        buf.write_i32::<LittleEndian>(self.response_flags.bits())?;
        buf.write_i64::<LittleEndian>(self.cursor_id)?;
        buf.write_i32::<LittleEndian>(self.starting_from)?;
        buf.write_i32::<LittleEndian>(self.num_returned)?;

        for document in &self.documents {
            document.to_writer(&mut *buf)?;
        }

        let length = (buf.len() - start) as i32;
        (&mut buf[start..start + 4]).write_i32::<LittleEndian>(length)?;

        Ok(())
    }

    /// Interprets this reply as the response to a `$cmd` query, yielding its single
    /// document.
    pub(crate) fn into_command_reply(mut self) -> Result<Document> {
        if self
            .response_flags
            .contains(ResponseFlags::QUERY_FAILURE)
        {
            let message = self
                .documents
                .first()
                .and_then(|doc| doc.get_str("$err").ok())
                .unwrap_or("query failure")
                .to_string();
            return Err(Error::new(ErrorKind::Command(crate::error::CommandError {
                code: 0,
                code_name: String::new(),
                message,
            })));
        }

        match self.documents.drain(..).next() {
            Some(document) => Ok(document),
            None => Err(Error::protocol(
                "the reply from the server did not contain a document",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use bson::doc;

    use super::{Header, Reply, ResponseFlags};

    #[test]
    fn round_trip() {
        let reply = Reply::new_command_reply(90, 14, doc! { "ok": 1 });
        let mut bytes = Vec::new();
        reply.write_to(&mut bytes).unwrap();

        let header = Header::from_bytes(&bytes[..Header::LENGTH]).unwrap();
        assert_eq!(header.length as usize, bytes.len());
        assert_eq!(header.response_to, 14);

        let parsed = Reply::parse(header, &bytes[Header::LENGTH..]).unwrap();
        assert_eq!(parsed.cursor_id, 0);
        assert_eq!(parsed.num_returned, 1);
        assert_eq!(parsed.documents, vec![doc! { "ok": 1 }]);
    }

    #[test]
    fn query_failure_surfaces_the_error_document() {
        let mut reply = Reply::new_command_reply(2, 1, doc! { "$err": "unauthorized" });
        reply.response_flags = ResponseFlags::QUERY_FAILURE;

        let err = reply.into_command_reply().unwrap_err();
        assert!(err.to_string().contains("unauthorized"));
    }

    #[test]
    fn truncated_document_is_a_protocol_error() {
        let reply = Reply::new_command_reply(3, 1, doc! { "ok": 1 });
        let mut bytes = Vec::new();
        reply.write_to(&mut bytes).unwrap();

        // Chop the final byte off the document.
        let header = Header::from_bytes(&bytes[..Header::LENGTH]).unwrap();
        assert!(Reply::parse(header, &bytes[Header::LENGTH..bytes.len() - 1]).is_err());
    }
}
