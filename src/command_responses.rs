//! serde models of server command replies.

use bson::{Bson, Document};
use serde::Deserialize;

#[derive(Debug, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IsMasterCommandResponse {
    #[serde(rename = "ismaster")]
    pub is_master: Option<bool>,
    pub ok: Option<f64>,
    pub max_bson_object_size: Option<i32>,
    pub max_message_size_bytes: Option<i32>,
    pub max_write_batch_size: Option<i32>,
    pub min_wire_version: Option<i32>,
    pub max_wire_version: Option<i32>,
    pub logical_session_timeout_minutes: Option<i64>,
    pub sasl_supported_mechs: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
pub struct DistinctCommandResponse {
    pub values: Vec<Bson>,
}

#[derive(Debug, Deserialize)]
pub struct UsersInfoCommandResponse {
    pub users: Vec<Document>,
}
