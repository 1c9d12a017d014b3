//! Authentication handshakes, run over the multiplexer before a connection is handed to
//! callers.

pub(crate) mod mongodb_cr;
pub(crate) mod sasl;
pub(crate) mod scram;

use std::{
    fmt,
    fmt::{Display, Formatter},
    str::FromStr,
};

use md5::{Digest, Md5};
use rand::{rngs::OsRng, Rng};
use typed_builder::TypedBuilder;

use crate::{
    conn::Connection,
    error::{Error, Result},
};

const SCRAM_SHA_1_STR: &str = "SCRAM-SHA-1";
const MONGODB_CR_STR: &str = "MONGODB-CR";

/// The number of characters in a client nonce.
const NONCE_LENGTH: usize = 24;

/// The printable characters a nonce is drawn from. The SCRAM delimiters `,` and `=` must
/// not appear.
const NONCE_ALPHABET: &[u8] =
    b"!\"#'$%&()*+-./0123456789:;<=>?@ABCDEFGHIJKLMNOPQRSTUVWXYZ[\\]^_";

/// The authentication mechanisms supported by this crate.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum AuthMechanism {
    /// The SCRAM-SHA-1 mechanism as defined in
    /// [RFC 5802](http://tools.ietf.org/html/rfc5802), with MongoDB's password hashing.
    ScramSha1,

    /// The legacy MongoDB challenge-response mechanism, deprecated since MongoDB 3.0.
    MongoDbCr,
}

impl AuthMechanism {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthMechanism::ScramSha1 => SCRAM_SHA_1_STR,
            AuthMechanism::MongoDbCr => MONGODB_CR_STR,
        }
    }
}

impl Display for AuthMechanism {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuthMechanism {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            SCRAM_SHA_1_STR => Ok(AuthMechanism::ScramSha1),
            MONGODB_CR_STR => Ok(AuthMechanism::MongoDbCr),
            other => Err(Error::invalid_argument(format!(
                "{} is not a supported authentication mechanism",
                other
            ))),
        }
    }
}

/// A set of credentials to authenticate a connection with.
#[derive(Clone, TypedBuilder)]
pub struct Credential {
    /// The username to authenticate as.
    #[builder(setter(into))]
    pub username: String,

    /// The password.
    #[builder(setter(into))]
    pub password: String,

    /// The database to authenticate against. Defaults to `admin`.
    #[builder(default, setter(strip_option, into))]
    pub source: Option<String>,

    /// The mechanism to authenticate with. Defaults to SCRAM-SHA-1.
    #[builder(default, setter(strip_option))]
    pub mechanism: Option<AuthMechanism>,
}

impl Credential {
    pub(crate) fn resolved_source(&self) -> &str {
        self.source.as_deref().unwrap_or("admin")
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("source", &self.source)
            .field("mechanism", &self.mechanism)
            .finish()
    }
}

/// Authenticates `conn` with the given credential. Run once, after the handshake and
/// before the connection accepts user commands.
pub(crate) async fn authenticate(conn: &Connection, credential: &Credential) -> Result<()> {
    let mechanism = credential
        .mechanism
        .clone()
        .unwrap_or(AuthMechanism::ScramSha1);

    tracing::debug!(
        mechanism = %mechanism,
        username = %credential.username,
        "authenticating connection"
    );

    match mechanism {
        AuthMechanism::ScramSha1 => scram::authenticate_stream(conn, credential).await,
        AuthMechanism::MongoDbCr => mongodb_cr::authenticate_stream(conn, credential).await,
    }
}

/// Generates a nonce from a cryptographic RNG.
pub(crate) fn generate_nonce() -> String {
    let mut rng = OsRng;
    (0..NONCE_LENGTH)
        .map(|_| NONCE_ALPHABET[rng.gen_range(0..NONCE_ALPHABET.len())] as char)
        .collect()
}

/// MongoDB's password derivation: the hex MD5 of `<username>:mongo:<password>`. Both
/// SCRAM-SHA-1 (as the PBKDF2 input) and MONGODB-CR use this rather than the raw
/// password.
pub(crate) fn mongo_password_digest(username: &str, password: &str) -> String {
    let mut md5 = Md5::new();
    md5.update(format!("{}:mongo:{}", username, password));
    hex::encode(md5.finalize())
}
