//! Contains the `Error` and `Result` types that `mongowire` uses.

use std::{fmt, sync::Arc};

use serde::Deserialize;
use thiserror::Error;

/// The result type for all methods that can return an error in this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// An error that can occur in the driver itself or the wire protocol.
///
/// The inner `ErrorKind` is wrapped in an `Arc` so that the error can be
/// cloned cheaply; a terminal connection error is delivered to every
/// outstanding awaiter.
#[derive(Clone, Debug, Error)]
#[error("{kind}")]
pub struct Error {
    pub kind: Arc<ErrorKind>,
}

impl Error {
    pub(crate) fn new(kind: ErrorKind) -> Self {
        Self {
            kind: Arc::new(kind),
        }
    }

    /// Creates an `Authentication` error for the given mechanism with the provided reason.
    pub(crate) fn authentication_error(
        mechanism: &str,
        failure: AuthFailure,
        reason: &str,
    ) -> Self {
        ErrorKind::Authentication {
            mechanism: mechanism.to_string(),
            failure,
            message: reason.to_string(),
        }
        .into()
    }

    /// Creates an `Authentication` error for the given mechanism when the server response is
    /// malformed.
    pub(crate) fn invalid_authentication_response(mechanism: &str) -> Self {
        Self::authentication_error(
            mechanism,
            AuthFailure::UnexpectedResponse,
            "invalid server response",
        )
    }

    pub(crate) fn protocol(message: impl Into<String>) -> Self {
        ErrorKind::Protocol {
            message: message.into(),
        }
        .into()
    }

    pub(crate) fn connection_closed(message: impl Into<String>) -> Self {
        ErrorKind::ConnectionClosed {
            message: message.into(),
        }
        .into()
    }

    pub(crate) fn invalid_argument(message: impl Into<String>) -> Self {
        ErrorKind::InvalidArgument {
            message: message.into(),
        }
        .into()
    }
}

impl<E> From<E> for Error
where
    ErrorKind: From<E>,
{
    fn from(err: E) -> Self {
        Self {
            kind: Arc::new(err.into()),
        }
    }
}

impl std::ops::Deref for Error {
    type Target = Arc<ErrorKind>;

    fn deref(&self) -> &Self::Target {
        &self.kind
    }
}

/// The types of errors that can occur.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ErrorKind {
    /// An invalid argument was provided to a database operation. No frame is written to the
    /// wire for these; the connection is still usable.
    #[error("an invalid argument was provided to a database operation: {message}")]
    InvalidArgument { message: String },

    #[error("{0}")]
    BsonDecode(#[from] bson::de::Error),

    #[error("{0}")]
    BsonEncode(#[from] bson::ser::Error),

    /// The server returned a reply with `ok != 1`. Local to the command that observed it.
    #[error("command failed: {0}")]
    Command(CommandError),

    /// A socket-level failure. Terminal for the connection.
    #[error("{0}")]
    Io(#[from] std::io::Error),

    /// The connection was closed, either explicitly or because a terminal error was observed.
    #[error("the connection is closed: {message}")]
    ConnectionClosed { message: String },

    /// A malformed frame, unexpected opcode, or truncated document was read off the socket.
    /// Terminal for the connection.
    #[error("invalid wire protocol data: {message}")]
    Protocol { message: String },

    /// An authentication handshake failed. The connection remains open but unauthenticated.
    #[error("{mechanism} authentication failed ({failure}): {message}")]
    Authentication {
        mechanism: String,
        failure: AuthFailure,
        message: String,
    },

    /// A write command reported per-statement or write-concern failures even though the
    /// command itself succeeded.
    #[error("an error occurred when trying to execute a write operation: {0}")]
    Write(WriteFailure),

    /// An operation was attempted on a cursor whose server-side state no longer exists.
    #[error("the cursor has been closed")]
    CursorClosed,
}

/// The ways in which an authentication handshake can fail, beyond the transport
/// errors shared with every other command exchange.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AuthFailure {
    /// The server rejected the credentials.
    IncorrectCredentials,

    /// A payload field that should have been base64 did not decode.
    InvalidBase64,

    /// The server's signature did not match the locally computed one. The peer does not
    /// actually know the credentials it is vouching for.
    ServerSignature,

    /// The server sent a structurally invalid handshake payload.
    UnexpectedResponse,
}

impl fmt::Display for AuthFailure {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            AuthFailure::IncorrectCredentials => "incorrect credentials",
            AuthFailure::InvalidBase64 => "invalid base64",
            AuthFailure::ServerSignature => "server signature mismatch",
            AuthFailure::UnexpectedResponse => "unexpected response",
        };
        fmt.write_str(s)
    }
}

/// An error that occurred due to a database command failing.
#[derive(Clone, Debug, Deserialize)]
pub struct CommandError {
    /// Identifies the type of error that occurred.
    #[serde(default)]
    pub code: i32,

    /// The name associated with the error code.
    #[serde(rename = "codeName", default)]
    pub code_name: String,

    /// A description of the error that occurred.
    #[serde(rename = "errmsg", default)]
    pub message: String,
}

impl fmt::Display for CommandError {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "({}): {}", self.code_name, self.message)
    }
}

/// An error that occurred during a write operation that wasn't due to being unable to satisfy
/// a write concern.
#[derive(Clone, Debug, Deserialize)]
pub struct WriteError {
    /// The index of the request that this error corresponds to in the batch that was sent.
    #[serde(default)]
    pub index: usize,

    /// Identifies the type of write error.
    pub code: i32,

    /// A description of the error that occurred.
    #[serde(rename = "errmsg", default)]
    pub message: String,
}

impl fmt::Display for WriteError {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(
            fmt,
            "write error at index {} (code {}): {}",
            self.index, self.code, self.message
        )
    }
}

/// An error that occurred due to not being able to satisfy a write concern.
#[derive(Clone, Debug, Deserialize)]
pub struct WriteConcernError {
    /// Identifies the type of write concern error.
    pub code: i32,

    /// The name associated with the error code.
    #[serde(rename = "codeName", default)]
    pub code_name: String,

    /// A description of the error that occurred.
    #[serde(rename = "errmsg", default)]
    pub message: String,
}

impl fmt::Display for WriteConcernError {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(
            fmt,
            "write concern error ({}): {}",
            self.code_name, self.message
        )
    }
}

/// An error that occurred when trying to execute a write operation.
#[derive(Clone, Debug)]
pub enum WriteFailure {
    WriteConcernError(WriteConcernError),
    WriteError(WriteError),
}

impl fmt::Display for WriteFailure {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            WriteFailure::WriteConcernError(e) => e.fmt(fmt),
            WriteFailure::WriteError(e) => e.fmt(fmt),
        }
    }
}
