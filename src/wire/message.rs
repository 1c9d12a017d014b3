use std::io::{Cursor, Write};

use bitflags::bitflags;
use bson::{Bson, Document};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use super::{read_cstring, read_document, Header, OpCode};
use crate::error::{Error, Result};

bitflags! {
    /// Represents the bitwise flags for an OP_MSG as defined in the spec.
    pub struct MessageFlags: u32 {
        const CHECKSUM_PRESENT = 0b_0000_0000_0000_0000_0000_0000_0000_0001;
        const MORE_TO_COME     = 0b_0000_0000_0000_0000_0000_0000_0000_0010;
        const EXHAUST_ALLOWED  = 0b_0000_0000_0000_0001_0000_0000_0000_0000;
    }
}

/// A document sequence, i.e. an OP_MSG section with payload type 1.
#[derive(Clone, Debug)]
pub struct DocumentSequence {
    pub identifier: String,
    pub documents: Vec<Document>,
}

/// Represents an OP_MSG wire protocol operation.
#[derive(Debug)]
pub struct Message {
    pub header: Header,
    pub flags: MessageFlags,
    // OP_MSG payload type 0
    pub document_payload: Document,
    // OP_MSG payload type 1
    pub document_sequences: Vec<DocumentSequence>,
}

impl Message {
    /// Creates an outgoing message. The `length` header field is computed during
    /// serialization.
    pub fn new(
        request_id: i32,
        document_payload: Document,
        document_sequences: Vec<DocumentSequence>,
    ) -> Self {
        Self {
            header: Header {
                length: 0,
                request_id,
                response_to: 0,
                op_code: OpCode::Message,
            },
            flags: MessageFlags::empty(),
            document_payload,
            document_sequences,
        }
    }

    /// Creates a reply message addressed to `response_to`. Only servers send these; the
    /// client side of this codec uses it in tests.
    pub fn new_reply(request_id: i32, response_to: i32, document_payload: Document) -> Self {
        let mut message = Self::new(request_id, document_payload, Vec::new());
        message.header.response_to = response_to;
        message
    }

    /// Parses the body of an OP_MSG frame.
    pub fn parse(header: Header, body: &[u8]) -> Result<Self> {
        let mut reader = Cursor::new(body);
        let flags = MessageFlags::from_bits_truncate(reader.read_u32::<LittleEndian>()?);

        // The trailing checksum is not validated; the core never requests one.
        let sections_end = if flags.contains(MessageFlags::CHECKSUM_PRESENT) {
            body.len()
                .checked_sub(4)
                .ok_or_else(|| Error::protocol("OP_MSG too short for its checksum"))?
        } else {
            body.len()
        };

        let mut document_payload = None;
        let mut document_sequences = Vec::new();

        while (reader.position() as usize) < sections_end {
            match reader.read_u8()? {
                0 => {
                    if document_payload.is_some() {
                        return Err(Error::protocol(
                            "an OP_MSG must contain exactly one payload type 0 section",
                        ));
                    }
                    document_payload = Some(read_document(&mut reader)?);
                }
                1 => document_sequences.push(Self::parse_sequence(&mut reader)?),
                other => {
                    return Err(Error::protocol(format!(
                        "invalid OP_MSG section kind: {}",
                        other
                    )))
                }
            }
        }

        if reader.position() as usize != sections_end {
            return Err(Error::protocol(format!(
                "OP_MSG sections claimed {} bytes but {} were read",
                sections_end,
                reader.position()
            )));
        }

        Ok(Self {
            header,
            flags,
            document_payload: document_payload.ok_or_else(|| {
                Error::protocol("an OP_MSG must contain exactly one payload type 0 section")
            })?,
            document_sequences,
        })
    }

    fn parse_sequence(reader: &mut Cursor<&[u8]>) -> Result<DocumentSequence> {
        let start = reader.position();
        let size = reader.read_i32::<LittleEndian>()?;
        if size < 4 {
            return Err(Error::protocol("OP_MSG document sequence is under-length"));
        }
        let end = start + size as u64;

        let identifier = read_cstring(reader)?;

        let mut documents = Vec::new();
        while reader.position() < end {
            documents.push(read_document(reader)?);
        }

        if reader.position() != end {
            return Err(Error::protocol(format!(
                "OP_MSG document sequence claimed {} bytes but {} were read",
                size,
                reader.position() - start
            )));
        }

        Ok(DocumentSequence {
            identifier,
            documents,
        })
    }

    /// Serializes the message, writing the complete frame to `writer`. Documents larger
    /// than `max_document_size` are refused before anything is written.
    pub fn write_to<W: Write>(&self, writer: &mut W, max_document_size: i32) -> Result<()> {
        let sections = self.sections_bytes(max_document_size)?;

        let total_length = Header::LENGTH + std::mem::size_of::<u32>() + sections.len();

        let header = Header {
            length: total_length as i32,
            ..self.header
        };

        header.write_to(writer)?;
        writer.write_u32::<LittleEndian>(self.flags.bits())?;
        writer.write_all(&sections)?;

        Ok(())
    }

    fn sections_bytes(&self, max_document_size: i32) -> Result<Vec<u8>> {
        let mut sections = Vec::new();

        // Payload type 0
        sections.push(0);
        write_sized_document(&mut sections, &self.document_payload, max_document_size)?;

        for document_sequence in &self.document_sequences {
            // Payload type 1
            sections.push(1);

            let mut documents = Vec::new();
            for document in &document_sequence.documents {
                write_sized_document(&mut documents, document, max_document_size)?;
            }

            let identifier_bytes = document_sequence.identifier.as_bytes();

            // Size bytes + identifier bytes + null-terminator byte + document bytes
            let size = 4 + identifier_bytes.len() + 1 + documents.len();
            sections.write_i32::<LittleEndian>(size as i32)?;
            sections.extend_from_slice(identifier_bytes);
            sections.push(0);
            sections.extend_from_slice(&documents);
        }

        Ok(sections)
    }

    /// Folds any document sequences back into the payload document, yielding the single
    /// document view of the message.
    pub fn into_document(self) -> Document {
        let mut document = self.document_payload;

        for sequence in self.document_sequences {
            let documents: Vec<Bson> = sequence
                .documents
                .into_iter()
                .map(Bson::Document)
                .collect();
            document.insert(sequence.identifier, documents);
        }

        document
    }
}

fn write_sized_document(buf: &mut Vec<u8>, document: &Document, max_size: i32) -> Result<()> {
    let start = buf.len();
    document.to_writer(&mut *buf)?;

    if buf.len() - start > max_size as usize {
        return Err(Error::invalid_argument(format!(
            "document exceeds the {}-byte maximum the server accepts",
            max_size
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use bson::doc;

    use super::{Header, Message, MessageFlags};
    use crate::wire::{DocumentSequence, WireMessage, DEFAULT_MAX_BSON_OBJECT_SIZE};

    fn round_trip(message: Message) -> Message {
        let mut bytes = Vec::new();
        message
            .write_to(&mut bytes, DEFAULT_MAX_BSON_OBJECT_SIZE)
            .unwrap();

        let header = Header::from_bytes(&bytes[..Header::LENGTH]).unwrap();
        assert_eq!(header.length as usize, bytes.len());

        Message::parse(header, &bytes[Header::LENGTH..]).unwrap()
    }

    #[test]
    fn body_round_trip() {
        let parsed = round_trip(Message::new(17, doc! { "isMaster": 1, "$db": "admin" }, vec![]));

        assert_eq!(parsed.header.request_id, 17);
        assert_eq!(
            parsed.document_payload,
            doc! { "isMaster": 1, "$db": "admin" }
        );
        assert!(parsed.document_sequences.is_empty());
    }

    #[test]
    fn document_sequence_round_trip() {
        let message = Message::new(
            3,
            doc! { "insert": "fish", "$db": "tank" },
            vec![DocumentSequence {
                identifier: "documents".to_string(),
                documents: vec![doc! { "_id": 1 }, doc! { "_id": 2 }],
            }],
        );

        let parsed = round_trip(message);
        assert_eq!(parsed.document_sequences.len(), 1);
        assert_eq!(parsed.document_sequences[0].identifier, "documents");
        assert_eq!(
            parsed.document_sequences[0].documents,
            vec![doc! { "_id": 1 }, doc! { "_id": 2 }]
        );

        let folded = parsed.into_document();
        assert_eq!(
            folded,
            doc! {
                "insert": "fish",
                "$db": "tank",
                "documents": [{ "_id": 1 }, { "_id": 2 }],
            }
        );
    }

    #[test]
    fn trailing_checksum_is_skipped() {
        let message = Message::new(9, doc! { "ping": 1 }, vec![]);
        let mut bytes = Vec::new();
        message
            .write_to(&mut bytes, DEFAULT_MAX_BSON_OBJECT_SIZE)
            .unwrap();

        // Rewrite the frame with the checksum bit set and 4 checksum bytes appended.
        let body_start = Header::LENGTH;
        let mut body = bytes[body_start..].to_vec();
        body[0] |= MessageFlags::CHECKSUM_PRESENT.bits() as u8;
        body.extend_from_slice(&0xDEAD_BEEF_u32.to_le_bytes());

        let header = Header {
            length: (Header::LENGTH + body.len()) as i32,
            ..Header::from_bytes(&bytes[..Header::LENGTH]).unwrap()
        };

        let parsed = Message::parse(header, &body).unwrap();
        assert_eq!(parsed.document_payload, doc! { "ping": 1 });
    }

    #[test]
    fn second_body_section_is_rejected() {
        let message = Message::new(5, doc! { "ping": 1 }, vec![]);
        let mut bytes = Vec::new();
        message
            .write_to(&mut bytes, DEFAULT_MAX_BSON_OBJECT_SIZE)
            .unwrap();

        // Duplicate the payload-0 section.
        let section = bytes[Header::LENGTH + 4..].to_vec();
        bytes.extend_from_slice(&section);

        let header = Header {
            length: bytes.len() as i32,
            ..Header::from_bytes(&bytes[..Header::LENGTH]).unwrap()
        };

        assert!(Message::parse(header, &bytes[Header::LENGTH..]).is_err());
    }

    #[tokio::test]
    async fn read_from_rejects_oversized_frames() {
        let message = Message::new(2, doc! { "ping": 1 }, vec![]);
        let mut bytes = Vec::new();
        message
            .write_to(&mut bytes, DEFAULT_MAX_BSON_OBJECT_SIZE)
            .unwrap();

        let err = WireMessage::read_from(&mut bytes.as_slice(), 20)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("over maximum"));
    }
}
