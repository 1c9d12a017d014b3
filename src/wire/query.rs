use std::io::Cursor;

use bitflags::bitflags;
use bson::Document;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use super::{read_cstring, read_document, Header, OpCode};
use crate::error::{Error, Result};

bitflags! {
    pub struct QueryFlags: i32 {
        const TAILABLE_CURSOR   = 0b00000010;
        const SLAVE_OK          = 0b00000100;
        const OPLOG_RELAY       = 0b00001000;
        const NO_CURSOR_TIMEOUT = 0b00010000;
        const AWAIT_DATA        = 0b00100000;
        const EXHAUST           = 0b01000000;
        const PARTIAL           = 0b10000000;
    }
}

/// Represents a legacy OP_QUERY wire protocol operation.
///
/// The core only emits these for `runCommand` against the `$cmd` pseudo-collection of
/// pre-OP_MSG servers, with `num_to_return` of 1.
#[derive(Debug)]
pub struct Query {
    pub header: Header,
    pub flags: QueryFlags,
    pub full_collection_name: String,
    pub num_to_skip: i32,
    pub num_to_return: i32,
    pub query: Document,
    pub return_field_selector: Option<Document>,
}

impl Query {
    /// Creates a `runCommand` query against `<db>.$cmd`.
    pub fn new_command(request_id: i32, db: &str, command: Document) -> Self {
        Self {
            header: Header {
                length: 0,
                request_id,
                response_to: 0,
                op_code: OpCode::Query,
            },
            flags: QueryFlags::empty(),
            full_collection_name: format!("{}.$cmd", db),
            num_to_skip: 0,
            num_to_return: 1,
            query: command,
            return_field_selector: None,
        }
    }

    /// Parses the body of an OP_QUERY frame.
    pub fn parse(header: Header, body: &[u8]) -> Result<Self> {
        let mut reader = Cursor::new(body);

        let flags = QueryFlags::from_bits_truncate(reader.read_i32::<LittleEndian>()?);
        let full_collection_name = read_cstring(&mut reader)?;
        let num_to_skip = reader.read_i32::<LittleEndian>()?;
        let num_to_return = reader.read_i32::<LittleEndian>()?;

        let query = read_document(&mut reader)?;

        let return_field_selector = if (reader.position() as usize) < body.len() {
            Some(read_document(&mut reader)?)
        } else {
            None
        };

        if reader.position() as usize != body.len() {
            return Err(Error::protocol(format!(
                "OP_QUERY body claimed {} bytes but {} were read",
                body.len(),
                reader.position()
            )));
        }

        Ok(Self {
            header,
            flags,
            full_collection_name,
            num_to_skip,
            num_to_return,
            query,
            return_field_selector,
        })
    }

    /// Serializes the query, writing the complete frame to `buf`. The `messageLength`
    /// field is patched in place once the body has been serialized.
    pub fn write_to(&self, buf: &mut Vec<u8>, max_document_size: i32) -> Result<()> {
        let start = buf.len();

        self.header.write_to(buf)?;
        buf.write_i32::<LittleEndian>(self.flags.bits())?;
        buf.extend_from_slice(self.full_collection_name.as_bytes());
        buf.push(0); // null-terminator for full_collection_name
        buf.write_i32::<LittleEndian>(self.num_to_skip)?;
        buf.write_i32::<LittleEndian>(self.num_to_return)?;

        let body_start = buf.len();
        self.query.to_writer(&mut *buf)?;

        if let Some(ref return_field_selector) = self.return_field_selector {
            return_field_selector.to_writer(&mut *buf)?;
        }

        if buf.len() - body_start > max_document_size as usize {
            buf.truncate(start);
            return Err(Error::invalid_argument(format!(
                "document exceeds the {}-byte maximum the server accepts",
                max_document_size
            )));
        }

        let length = (buf.len() - start) as i32;
        (&mut buf[start..start + 4]).write_i32::<LittleEndian>(length)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use bson::doc;
    use byteorder::{LittleEndian, ReadBytesExt};

    use super::{Header, Query};
    use crate::wire::{OpCode, DEFAULT_MAX_BSON_OBJECT_SIZE};

    #[test]
    fn command_query_layout() {
        let query = Query::new_command(41, "admin", doc! { "isMaster": 1 });
        let mut bytes = Vec::new();
        query
            .write_to(&mut bytes, DEFAULT_MAX_BSON_OBJECT_SIZE)
            .unwrap();

        // messageLength was patched in place and covers the whole frame.
        let mut head = &bytes[..];
        assert_eq!(head.read_i32::<LittleEndian>().unwrap() as usize, bytes.len());
        assert_eq!(head.read_i32::<LittleEndian>().unwrap(), 41);
        assert_eq!(head.read_i32::<LittleEndian>().unwrap(), 0);
        assert_eq!(head.read_i32::<LittleEndian>().unwrap(), OpCode::Query as i32);

        // flags, then the NUL-terminated namespace.
        assert_eq!(head.read_i32::<LittleEndian>().unwrap(), 0);
        assert_eq!(&bytes[20..30], b"admin.$cmd");
        assert_eq!(bytes[30], 0);
    }

    #[test]
    fn round_trip() {
        let query = Query::new_command(7, "db", doc! { "count": "fish" });
        let mut bytes = Vec::new();
        query
            .write_to(&mut bytes, DEFAULT_MAX_BSON_OBJECT_SIZE)
            .unwrap();

        let header = Header::from_bytes(&bytes[..Header::LENGTH]).unwrap();
        let parsed = Query::parse(header, &bytes[Header::LENGTH..]).unwrap();

        assert_eq!(parsed.full_collection_name, "db.$cmd");
        assert_eq!(parsed.num_to_return, 1);
        assert_eq!(parsed.query, doc! { "count": "fish" });
        assert!(parsed.return_field_selector.is_none());
    }
}
