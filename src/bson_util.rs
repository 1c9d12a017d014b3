use bson::{Bson, Document};
use serde::{ser, Serializer};

use crate::error::{ErrorKind, Result};

/// Coerce numeric types into an `i64` if it would be lossless to do so. If this Bson is not
/// numeric or the conversion would be lossy (e.g. 1.5 -> 1), this returns `None`.
pub(crate) fn get_int(val: &Bson) -> Option<i64> {
    match *val {
        Bson::Int32(i) => Some(i64::from(i)),
        Bson::Int64(i) => Some(i),
        Bson::Double(f) if f == f as i64 as f64 => Some(f as i64),
        _ => None,
    }
}

pub(crate) fn to_bson_array(docs: &[Document]) -> Bson {
    Bson::Array(docs.iter().map(|doc| Bson::Document(doc.clone())).collect())
}

pub(crate) fn update_document_check(update: &Document) -> Result<()> {
    match update.iter().next() {
        Some((s, _)) if s.starts_with('$') => Ok(()),
        Some(_) => Err(ErrorKind::InvalidArgument {
            message: "update document must have first key starting with '$'".to_string(),
        }
        .into()),
        None => Err(ErrorKind::InvalidArgument {
            message: "update document is empty; there is nothing to do".to_string(),
        }
        .into()),
    }
}

pub(crate) fn replacement_document_check(replacement: &Document) -> Result<()> {
    match replacement.iter().next() {
        Some((s, _)) if !s.starts_with('$') => Ok(()),
        _ => Err(ErrorKind::InvalidArgument {
            message: "replace document must have first key not starting with '$'".to_string(),
        }
        .into()),
    }
}

#[allow(clippy::trivially_copy_pass_by_ref)]
pub(crate) fn serialize_u32_as_i32<S: Serializer>(
    val: &Option<u32>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    match val {
        Some(val) if *val <= i32::MAX as u32 => serializer.serialize_i32(*val as i32),
        None => serializer.serialize_none(),
        _ => Err(ser::Error::custom("u32 specified does not fit into an i32")),
    }
}

#[cfg(test)]
mod tests {
    use bson::{doc, Bson};

    use super::{get_int, replacement_document_check, update_document_check};

    #[test]
    fn get_int_coerces_losslessly() {
        assert_eq!(get_int(&Bson::Int32(5)), Some(5));
        assert_eq!(get_int(&Bson::Int64(1 << 40)), Some(1 << 40));
        assert_eq!(get_int(&Bson::Double(3.0)), Some(3));
        assert_eq!(get_int(&Bson::Double(3.5)), None);
        assert_eq!(get_int(&Bson::String("3".to_string())), None);
    }

    #[test]
    fn update_document_checks() {
        assert!(update_document_check(&doc! { "$set": { "x": 1 } }).is_ok());
        assert!(update_document_check(&doc! { "x": 1 }).is_err());
        assert!(update_document_check(&doc! {}).is_err());
    }

    #[test]
    fn replacement_document_checks() {
        assert!(replacement_document_check(&doc! { "x": 1 }).is_ok());
        assert!(replacement_document_check(&doc! { "$set": { "x": 1 } }).is_err());
        assert!(replacement_document_check(&doc! {}).is_err());
    }
}
