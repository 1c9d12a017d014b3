//! The MongoDB wire protocol codec: frame headers, OP_MSG, and the legacy
//! OP_QUERY/OP_REPLY pair.
//!
//! Everything here works on complete frames. Writers serialize into an in-memory buffer
//! that is flushed with a single write; the reader side pulls a header, then the body,
//! then parses the body according to the opcode. All multi-byte fields are
//! little-endian.

mod header;
mod message;
mod query;
mod reply;

use std::io::Read;

use bson::Document;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::{Error, ErrorKind, Result};

pub use self::{
    header::{Header, OpCode},
    message::{DocumentSequence, Message, MessageFlags},
    query::{Query, QueryFlags},
    reply::{Reply, ResponseFlags},
};

/// The default maximum permitted size of a wire message, used until the server reports its
/// own limit during the handshake.
pub const DEFAULT_MAX_MESSAGE_SIZE_BYTES: i32 = 48 * 1024 * 1024;

/// The default maximum permitted size of a single BSON document, used until the server
/// reports its own limit during the handshake.
pub const DEFAULT_MAX_BSON_OBJECT_SIZE: i32 = 16 * 1024 * 1024;

/// A parsed incoming frame.
#[derive(Debug)]
pub enum WireMessage {
    Message(Message),
    Query(Query),
    Reply(Reply),
}

impl WireMessage {
    /// Reads the next frame off `reader`, rejecting frames larger than `max_message_size`.
    pub async fn read_from<R: AsyncRead + Unpin>(
        reader: &mut R,
        max_message_size: i32,
    ) -> Result<Self> {
        let mut header_bytes = [0u8; Header::LENGTH];
        reader.read_exact(&mut header_bytes).await?;
        let header = Header::from_bytes(&header_bytes)?;

        if header.length < Header::LENGTH as i32 {
            return Err(Error::protocol(format!(
                "message length {} is shorter than the header itself",
                header.length
            )));
        }
        if header.length > max_message_size {
            return Err(Error::protocol(format!(
                "message length {} over maximum {}",
                header.length, max_message_size
            )));
        }

        let mut body = vec![0u8; header.length as usize - Header::LENGTH];
        reader.read_exact(&mut body).await?;

        match header.op_code {
            OpCode::Message => Ok(WireMessage::Message(Message::parse(header, &body)?)),
            OpCode::Query => Ok(WireMessage::Query(Query::parse(header, &body)?)),
            OpCode::Reply => Ok(WireMessage::Reply(Reply::parse(header, &body)?)),
        }
    }

    /// The `responseTo` header field of this frame.
    pub fn response_to(&self) -> i32 {
        match self {
            WireMessage::Message(m) => m.header.response_to,
            WireMessage::Query(q) => q.header.response_to,
            WireMessage::Reply(r) => r.header.response_to,
        }
    }

    /// The `requestID` header field of this frame.
    pub fn request_id(&self) -> i32 {
        match self {
            WireMessage::Message(m) => m.header.request_id,
            WireMessage::Query(q) => q.header.request_id,
            WireMessage::Reply(r) => r.header.request_id,
        }
    }

    /// Interprets this frame as a command reply, yielding its single body document.
    ///
    /// Errors from this conversion are local to the command awaiting the reply; a reply
    /// that parsed as a frame but carries a query failure or no document does not tear the
    /// connection down.
    pub(crate) fn into_command_reply(self) -> Result<Document> {
        match self {
            WireMessage::Message(m) => Ok(m.into_document()),
            WireMessage::Reply(r) => r.into_command_reply(),
            WireMessage::Query(_) => Err(Error::protocol(
                "server sent an OP_QUERY frame; queries only travel client to server",
            )),
        }
    }
}

/// Reads a NUL-terminated string out of `reader`.
pub(crate) fn read_cstring<R: Read>(reader: &mut R) -> Result<String> {
    let mut bytes = Vec::new();
    let mut byte = [0u8; 1];

    loop {
        reader.read_exact(&mut byte)?;
        if byte[0] == 0 {
            break;
        }
        bytes.push(byte[0]);
    }

    String::from_utf8(bytes)
        .map_err(|_| Error::protocol("cstring field contained invalid UTF-8"))
}

/// Parses a single BSON document out of `reader`, surfacing truncation as a protocol
/// error.
pub(crate) fn read_document<R: Read>(reader: &mut R) -> Result<Document> {
    Document::from_reader(reader).map_err(|e| {
        Error::new(ErrorKind::Protocol {
            message: format!("malformed BSON document in frame body: {}", e),
        })
    })
}
