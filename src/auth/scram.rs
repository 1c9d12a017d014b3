//! The SCRAM-SHA-1 conversation, per RFC 5802 with MongoDB's password hashing.

use std::{collections::HashMap, ops::Range, str, sync::RwLock};

use hmac::{Hmac, Mac};
use lazy_static::lazy_static;
use sha1::{Digest, Sha1};

use crate::{
    auth::{
        self,
        sasl::{SaslContinue, SaslResponse, SaslStart},
        AuthMechanism, Credential,
    },
    conn::Connection,
    error::{AuthFailure, Error, Result},
};

const MECHANISM: &str = "SCRAM-SHA-1";

// The single letter attribute keys in SCRAM messages.
const ITERATION_COUNT_KEY: char = 'i';
const ERROR_KEY: char = 'e';
const PROOF_KEY: char = 'p';
const VERIFIER_KEY: char = 'v';
const NONCE_KEY: char = 'r';
const SALT_KEY: char = 's';
const CHANNEL_BINDING_KEY: char = 'c';
const USERNAME_KEY: char = 'n';

/// Constant specifying that we won't be using channel binding.
const NO_CHANNEL_BINDING: char = 'n';

/// The output size of SHA-1 in bytes.
const HASH_SIZE: usize = 20;

lazy_static! {
    /// Cache of pre-computed salted passwords.
    static ref CREDENTIAL_CACHE: RwLock<HashMap<CacheEntry, Vec<u8>>> = {
        RwLock::new(HashMap::new())
    };
}

#[derive(Hash, Eq, PartialEq)]
struct CacheEntry {
    password: String,
    salt: Vec<u8>,
    i: u32,
}

/// Performs SCRAM-SHA-1 authentication for a given connection.
pub(crate) async fn authenticate_stream(conn: &Connection, credential: &Credential) -> Result<()> {
    let source = credential.resolved_source().to_string();
    let nonce = auth::generate_nonce();

    let client_first = ClientFirst::new(&credential.username, nonce.as_str());

    let command = SaslStart::new(
        source.clone(),
        AuthMechanism::ScramSha1,
        client_first.message().as_bytes().to_vec(),
    )
    .into_command();
    let response = conn.send_command(command).await?;
    let server_first = ServerFirst::parse(SaslResponse::parse(
        MECHANISM,
        response.raw_response,
    )?)?;
    server_first.validate(nonce.as_str())?;

    let cache_entry_key = CacheEntry {
        password: credential.password.clone(),
        salt: server_first.salt().to_vec(),
        i: server_first.i(),
    };
    let (should_update_cache, salted_password) =
        match CREDENTIAL_CACHE.read().unwrap().get(&cache_entry_key) {
            Some(pwd) => (false, pwd.clone()),
            None => (
                true,
                compute_salted_password(
                    &credential.username,
                    &credential.password,
                    server_first.i(),
                    server_first.salt(),
                )?,
            ),
        };

    let client_final = ClientFinal::new(salted_password.as_slice(), &client_first, &server_first)?;

    let command = SaslContinue::new(
        source.clone(),
        server_first.conversation_id().clone(),
        client_final.message().as_bytes().to_vec(),
    )
    .into_command();
    let response = conn.send_command(command).await?;
    let server_final = ServerFinal::parse(SaslResponse::parse(
        MECHANISM,
        response.raw_response,
    )?)?;
    server_final.validate(salted_password.as_slice(), &client_final)?;

    // The server may want further no-op exchanges before it reports completion; answer
    // each with an empty payload until it does.
    let mut done = server_final.done();
    while !done {
        let command = SaslContinue::new(
            source.clone(),
            server_final.conversation_id().clone(),
            Vec::new(),
        )
        .into_command();
        let response = conn.send_command(command).await?;
        let sasl_response = SaslResponse::parse(MECHANISM, response.raw_response)?;

        if &sasl_response.conversation_id != server_final.conversation_id() {
            return Err(Error::authentication_error(
                MECHANISM,
                AuthFailure::UnexpectedResponse,
                "mismatched conversationId's",
            ));
        }

        done = sasl_response.done;
    }

    if should_update_cache {
        if let Ok(ref mut cache) = CREDENTIAL_CACHE.write() {
            if cache.get(&cache_entry_key).is_none() {
                cache.insert(cache_entry_key, salted_password);
            }
        }
    }

    Ok(())
}

/// Escapes a username for embedding in the client-first message: `=` becomes `=3D` and
/// `,` becomes `=2C`.
fn escape_username(username: &str) -> String {
    username.replace('=', "=3D").replace(',', "=2C")
}

fn xor(lhs: &[u8], rhs: &[u8]) -> Vec<u8> {
    assert_eq!(lhs.len(), rhs.len());

    lhs.iter().zip(rhs.iter()).map(|(l, r)| l ^ r).collect()
}

/// HMAC-SHA-1 as used throughout the SCRAM computations.
fn hmac(key: &[u8], input: &[u8]) -> Result<Vec<u8>> {
    let mut mac = Hmac::<Sha1>::new_from_slice(key).map_err(|_| {
        Error::authentication_error(MECHANISM, AuthFailure::UnexpectedResponse, "internal error")
    })?;
    mac.update(input);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Compute the HMAC of the given input and verify it matches the given signature.
fn hmac_verify(key: &[u8], input: &[u8], signature: &[u8]) -> Result<()> {
    let mut mac = Hmac::<Sha1>::new_from_slice(key).map_err(|_| {
        Error::authentication_error(MECHANISM, AuthFailure::UnexpectedResponse, "internal error")
    })?;
    mac.update(input);
    mac.verify_slice(signature).map_err(|_| {
        Error::authentication_error(
            MECHANISM,
            AuthFailure::ServerSignature,
            "the server's signature does not match the locally computed one",
        )
    })
}

/// The "H" function defined in the SCRAM RFC.
fn h(input: &[u8]) -> Vec<u8> {
    let mut hash = Sha1::new();
    hash.update(input);
    hash.finalize().to_vec()
}

/// The "Hi" function defined in the SCRAM RFC: PBKDF2 with HMAC-SHA-1 producing a single
/// hash-sized block.
fn h_i(input: &str, salt: &[u8], iterations: u32) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; HASH_SIZE];
    pbkdf2::pbkdf2::<Hmac<Sha1>>(input.as_bytes(), salt, iterations, buf.as_mut_slice()).map_err(
        |_| {
            Error::authentication_error(
                MECHANISM,
                AuthFailure::UnexpectedResponse,
                "internal error",
            )
        },
    )?;
    Ok(buf)
}

/// Computes the salted password from MongoDB's password digest.
fn compute_salted_password(
    username: &str,
    password: &str,
    i: u32,
    salt: &[u8],
) -> Result<Vec<u8>> {
    let digest = auth::mongo_password_digest(username, password);
    h_i(&digest, salt, i)
}

/// Parses a string slice of the form "<expected_key>=<body>" into "<body>", if possible.
fn parse_kvp(str: &str, expected_key: char) -> Result<String> {
    if str.chars().next() != Some(expected_key) || str.chars().nth(1) != Some('=') {
        Err(Error::invalid_authentication_response(MECHANISM))
    } else {
        Ok(str.chars().skip(2).collect())
    }
}

/// Model of the first message sent by the client.
struct ClientFirst {
    message: String,

    gs2_header: Range<usize>,

    bare: Range<usize>,
}

impl ClientFirst {
    fn new(username: &str, nonce: &str) -> Self {
        let gs2_header = format!("{},,", NO_CHANNEL_BINDING);
        let bare = format!(
            "{}={},{}={}",
            USERNAME_KEY,
            escape_username(username),
            NONCE_KEY,
            nonce
        );
        let full = format!("{}{}", &gs2_header, &bare);
        let end = full.len();
        ClientFirst {
            message: full,
            gs2_header: Range {
                start: 0,
                end: gs2_header.len(),
            },
            bare: Range {
                start: gs2_header.len(),
                end,
            },
        }
    }

    fn bare_message(&self) -> &str {
        &self.message[self.bare.clone()]
    }

    fn gs2_header(&self) -> &str {
        &self.message[self.gs2_header.clone()]
    }

    fn message(&self) -> &str {
        &self.message[..]
    }
}

/// Model of the first message received from the server.
///
/// This MUST be validated before sending the `ClientFinal` message back to the server.
struct ServerFirst {
    conversation_id: bson::Bson,
    done: bool,
    message: String,
    nonce: String,
    salt: Vec<u8>,
    i: u32,
}

impl ServerFirst {
    fn parse(response: SaslResponse) -> Result<Self> {
        let message = str::from_utf8(&response.payload)
            .map_err(|_| Error::invalid_authentication_response(MECHANISM))?;

        let parts: Vec<&str> = message.split(',').collect();

        if parts.len() < 3 {
            return Err(Error::invalid_authentication_response(MECHANISM));
        }

        let full_nonce = parse_kvp(parts[0], NONCE_KEY)?;

        let salt = base64::decode(parse_kvp(parts[1], SALT_KEY)?.as_str()).map_err(|_| {
            Error::authentication_error(
                MECHANISM,
                AuthFailure::InvalidBase64,
                "salt is not valid base64",
            )
        })?;

        let i: u32 = parse_kvp(parts[2], ITERATION_COUNT_KEY)?
            .parse()
            .map_err(|_| {
                Error::authentication_error(
                    MECHANISM,
                    AuthFailure::UnexpectedResponse,
                    "iteration count invalid",
                )
            })?;

        Ok(ServerFirst {
            conversation_id: response.conversation_id,
            done: response.done,
            message: message.to_string(),
            nonce: full_nonce,
            salt,
            i,
        })
    }

    fn conversation_id(&self) -> &bson::Bson {
        &self.conversation_id
    }

    fn message(&self) -> &str {
        self.message.as_str()
    }

    fn nonce(&self) -> &str {
        self.nonce.as_str()
    }

    fn salt(&self) -> &[u8] {
        self.salt.as_slice()
    }

    fn i(&self) -> u32 {
        self.i
    }

    fn validate(&self, nonce: &str) -> Result<()> {
        if self.done {
            Err(Error::authentication_error(
                MECHANISM,
                AuthFailure::UnexpectedResponse,
                "handshake terminated early",
            ))
        } else if self.nonce.len() < nonce.len() || &self.nonce[0..nonce.len()] != nonce {
            Err(Error::authentication_error(
                MECHANISM,
                AuthFailure::UnexpectedResponse,
                "mismatched nonce",
            ))
        } else {
            Ok(())
        }
    }
}

/// Model of the final message sent by the client.
///
/// Contains the "AuthMessage" mentioned in the RFC used in computing the client and
/// server signatures.
struct ClientFinal {
    message: String,
    auth_message: String,
}

impl ClientFinal {
    fn new(
        salted_password: &[u8],
        client_first: &ClientFirst,
        server_first: &ServerFirst,
    ) -> Result<Self> {
        let client_key = hmac(salted_password, b"Client Key")?;
        let stored_key = h(client_key.as_slice());

        let without_proof = format!(
            "{}={},{}={}",
            CHANNEL_BINDING_KEY,
            base64::encode(client_first.gs2_header()),
            NONCE_KEY,
            server_first.nonce()
        );
        let auth_message = format!(
            "{},{},{}",
            client_first.bare_message(),
            server_first.message(),
            without_proof.as_str()
        );
        let client_signature = hmac(stored_key.as_slice(), auth_message.as_bytes())?;
        let client_proof =
            base64::encode(xor(client_key.as_slice(), client_signature.as_slice()).as_slice());

        let message = format!("{},{}={}", without_proof, PROOF_KEY, client_proof);

        Ok(ClientFinal {
            message,
            auth_message,
        })
    }

    fn message(&self) -> &str {
        self.message.as_str()
    }

    fn auth_message(&self) -> &str {
        self.auth_message.as_str()
    }
}

enum ServerFinalBody {
    Error(String),
    Verifier(String),
}

/// Model of the final message received from the server.
///
/// This MUST be validated before the handshake is considered complete.
struct ServerFinal {
    conversation_id: bson::Bson,
    done: bool,
    body: ServerFinalBody,
}

impl ServerFinal {
    fn parse(response: SaslResponse) -> Result<Self> {
        let message = str::from_utf8(&response.payload)
            .map_err(|_| Error::invalid_authentication_response(MECHANISM))?;

        let first = message
            .chars()
            .next()
            .ok_or_else(|| Error::invalid_authentication_response(MECHANISM))?;
        let body = if first == ERROR_KEY {
            ServerFinalBody::Error(parse_kvp(message, ERROR_KEY)?)
        } else if first == VERIFIER_KEY {
            ServerFinalBody::Verifier(parse_kvp(message, VERIFIER_KEY)?)
        } else {
            return Err(Error::invalid_authentication_response(MECHANISM));
        };

        Ok(ServerFinal {
            conversation_id: response.conversation_id,
            done: response.done,
            body,
        })
    }

    fn validate(&self, salted_password: &[u8], client_final: &ClientFinal) -> Result<()> {
        match self.body {
            ServerFinalBody::Verifier(ref body) => {
                let body_decoded = base64::decode(body.as_bytes()).map_err(|_| {
                    Error::authentication_error(
                        MECHANISM,
                        AuthFailure::InvalidBase64,
                        "server verifier is not valid base64",
                    )
                })?;

                let server_key = hmac(salted_password, b"Server Key")?;
                hmac_verify(
                    server_key.as_slice(),
                    client_final.auth_message().as_bytes(),
                    body_decoded.as_slice(),
                )
            }
            ServerFinalBody::Error(ref err) => Err(Error::authentication_error(
                MECHANISM,
                AuthFailure::IncorrectCredentials,
                err.as_str(),
            )),
        }
    }

    fn conversation_id(&self) -> &bson::Bson {
        &self.conversation_id
    }

    fn done(&self) -> bool {
        self.done
    }
}
