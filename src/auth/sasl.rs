//! Command shaping and reply parsing shared by the SASL-based mechanisms.

use bson::{doc, spec::BinarySubtype, Binary, Bson, Document};

use crate::{
    auth::AuthMechanism,
    bson_util,
    conn::Command,
    error::{AuthFailure, Error, Result},
};

/// Encapsulates the command building of a `saslStart` command.
pub(super) struct SaslStart {
    source: String,
    mechanism: AuthMechanism,
    payload: Vec<u8>,
}

impl SaslStart {
    pub(super) fn new(source: String, mechanism: AuthMechanism, payload: Vec<u8>) -> Self {
        Self {
            source,
            mechanism,
            payload,
        }
    }

    pub(super) fn into_command(self) -> Command {
        let body = doc! {
            "saslStart": 1,
            "mechanism": self.mechanism.as_str(),
            "payload": Binary { subtype: BinarySubtype::Generic, bytes: self.payload },
        };

        Command::new("saslStart", self.source, body)
    }
}

/// Encapsulates the command building of a `saslContinue` command.
pub(super) struct SaslContinue {
    source: String,
    conversation_id: Bson,
    payload: Vec<u8>,
}

impl SaslContinue {
    pub(super) fn new(source: String, conversation_id: Bson, payload: Vec<u8>) -> Self {
        Self {
            source,
            conversation_id,
            payload,
        }
    }

    pub(super) fn into_command(self) -> Command {
        let body = doc! {
            "saslContinue": 1,
            "conversationId": self.conversation_id,
            "payload": Binary { subtype: BinarySubtype::Generic, bytes: self.payload },
        };

        Command::new("saslContinue", self.source, body)
    }
}

/// Validates that a `saslStart` or `saslContinue` reply is successful. An unsuccessful
/// reply means the server rejected the credentials.
fn validate_command_success(mechanism: &str, response: &Document) -> Result<()> {
    let ok = response
        .get("ok")
        .ok_or_else(|| Error::invalid_authentication_response(mechanism))?;

    match bson_util::get_int(ok) {
        Some(1) => Ok(()),
        Some(_) => Err(Error::authentication_error(
            mechanism,
            AuthFailure::IncorrectCredentials,
            response
                .get_str("errmsg")
                .unwrap_or("authentication failure"),
        )),
        None => Err(Error::invalid_authentication_response(mechanism)),
    }
}

/// Encapsulates the parsing of the reply to a `saslStart` or `saslContinue` command.
#[derive(Debug)]
pub(super) struct SaslResponse {
    pub(super) conversation_id: Bson,
    pub(super) done: bool,
    pub(super) payload: Vec<u8>,
}

impl SaslResponse {
    pub(super) fn parse(mechanism: &str, mut response: Document) -> Result<Self> {
        validate_command_success(mechanism, &response)?;

        let conversation_id = response
            .remove("conversationId")
            .ok_or_else(|| Error::invalid_authentication_response(mechanism))?;
        let done = response
            .get_bool("done")
            .map_err(|_| Error::invalid_authentication_response(mechanism))?;
        let payload = match response.get_binary_generic("payload") {
            Ok(payload) => payload.clone(),
            Err(_) => return Err(Error::invalid_authentication_response(mechanism)),
        };

        Ok(Self {
            conversation_id,
            done,
            payload,
        })
    }
}

#[cfg(test)]
mod tests {
    use bson::{doc, spec::BinarySubtype, Binary};

    use super::SaslResponse;
    use crate::error::{AuthFailure, ErrorKind};

    #[test]
    fn failed_exchange_reports_incorrect_credentials() {
        let response = doc! {
            "ok": 0,
            "code": 18,
            "errmsg": "Authentication failed.",
        };

        let err = SaslResponse::parse("SCRAM-SHA-1", response).unwrap_err();
        match *err.kind {
            ErrorKind::Authentication { failure, .. } => {
                assert_eq!(failure, AuthFailure::IncorrectCredentials);
            }
            ref other => panic!("expected authentication error, got {:?}", other),
        }
    }

    #[test]
    fn successful_exchange_parses() {
        let response = doc! {
            "ok": 1,
            "conversationId": 1,
            "done": false,
            "payload": Binary { subtype: BinarySubtype::Generic, bytes: b"r=abc".to_vec() },
        };

        let parsed = SaslResponse::parse("SCRAM-SHA-1", response).unwrap();
        assert!(!parsed.done);
        assert_eq!(parsed.payload, b"r=abc");
    }
}
