//! The `Connection` type: a single multiplexed wire-protocol connection.

mod command;

use std::{
    collections::HashMap,
    io,
    sync::{
        atomic::{AtomicBool, AtomicI32, Ordering},
        Arc, Mutex, Weak,
    },
    time::Instant,
};

use bson::{oid::ObjectId, Document};
use tokio::{
    io::AsyncWriteExt,
    net::{tcp::OwnedReadHalf, TcpStream},
    sync::oneshot,
};

use crate::{
    auth,
    coll::Namespace,
    db::Database,
    error::{Error, ErrorKind, Result},
    oid::ObjectIdGenerator,
    operation::{IsMaster, KillCursors, Operation},
    options::{ConnectionOptions, StreamAddress},
    wire::{
        Message, Query, WireMessage, DEFAULT_MAX_BSON_OBJECT_SIZE, DEFAULT_MAX_MESSAGE_SIZE_BYTES,
    },
};

pub use command::{Command, CommandResponse};

/// The driver name reported to the server during the handshake.
pub const DRIVER_NAME: &str = "mongowire";

/// OP_MSG support was introduced in MongoDB 3.6, wire version 6.
const OP_MSG_MIN_WIRE_VERSION: i32 = 6;

/// A single connection to a MongoDB server.
///
/// The connection is full-duplex: any number of tasks may submit commands concurrently,
/// and replies are routed back to their submitters by the `responseTo` field of the wire
/// frame, regardless of the order in which the server produces them.
///
/// `Connection` uses [`std::sync::Arc`](https://doc.rust-lang.org/std/sync/struct.Arc.html)
/// internally, so it can safely be shared across threads or async tasks.
#[derive(Clone, Debug)]
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

#[derive(Debug)]
struct ConnectionInner {
    address: StreamAddress,
    writer: tokio::sync::Mutex<tokio::net::tcp::OwnedWriteHalf>,
    in_flight: Mutex<InFlight>,
    use_op_msg: AtomicBool,
    max_bson_object_size: AtomicI32,
    max_message_size_bytes: AtomicI32,
    authenticated: AtomicBool,
    id_generator: ObjectIdGenerator,
}

/// The in-flight request table. Request-id allocation and awaiter registration share this
/// one critical section, which is what makes reply delivery race-free.
#[derive(Debug)]
struct InFlight {
    next_request_id: i32,
    pending: HashMap<i32, oneshot::Sender<Result<Document>>>,
    closed: Option<Error>,
}

impl InFlight {
    fn allocate(&mut self) -> i32 {
        let id = self.next_request_id;
        self.next_request_id = if id == i32::MAX { 1 } else { id + 1 };
        id
    }
}

impl Connection {
    /// Dials `address` and performs the handshake, authenticating if the options carry a
    /// credential. The connection is not handed back until it is ready for user commands.
    pub async fn connect(address: StreamAddress, options: ConnectionOptions) -> Result<Self> {
        let target = (address.hostname.clone(), address.port_or_default());
        let stream = match options.connect_timeout {
            Some(timeout) => tokio::time::timeout(timeout, TcpStream::connect(target))
                .await
                .map_err(|_| {
                    Error::new(ErrorKind::Io(io::Error::new(
                        io::ErrorKind::TimedOut,
                        format!("timed out connecting to {}", address),
                    )))
                })??,
            None => TcpStream::connect(target).await?,
        };
        stream.set_nodelay(true)?;

        Self::with_stream(stream, address, options).await
    }

    /// Takes ownership of an established stream (dialed by external code) and performs
    /// the handshake and authentication on it.
    pub async fn with_stream(
        stream: TcpStream,
        address: StreamAddress,
        options: ConnectionOptions,
    ) -> Result<Self> {
        let (reader, writer) = stream.into_split();

        let inner = Arc::new(ConnectionInner {
            address,
            writer: tokio::sync::Mutex::new(writer),
            in_flight: Mutex::new(InFlight {
                next_request_id: 1,
                pending: HashMap::new(),
                closed: None,
            }),
            use_op_msg: AtomicBool::new(false),
            max_bson_object_size: AtomicI32::new(DEFAULT_MAX_BSON_OBJECT_SIZE),
            max_message_size_bytes: AtomicI32::new(DEFAULT_MAX_MESSAGE_SIZE_BYTES),
            authenticated: AtomicBool::new(false),
            id_generator: ObjectIdGenerator::new(),
        });

        tokio::spawn(read_loop(reader, Arc::downgrade(&inner)));

        let conn = Self { inner };
        conn.handshake().await?;

        if let Some(ref credential) = options.credential {
            auth::authenticate(&conn, credential).await?;
            conn.inner.authenticated.store(true, Ordering::SeqCst);
        }

        Ok(conn)
    }

    /// The initial `isMaster` exchange. This always travels the legacy OP_QUERY path,
    /// since OP_MSG support is only known afterwards.
    async fn handshake(&self) -> Result<()> {
        let start = Instant::now();
        let reply = self.execute(IsMaster::handshake()).await?;
        tracing::debug!(
            address = %self.inner.address,
            round_trip = ?start.elapsed(),
            max_wire_version = ?reply.max_wire_version,
            "server handshake complete"
        );

        if let Some(size) = reply.max_bson_object_size {
            self.inner
                .max_bson_object_size
                .store(size, Ordering::SeqCst);
        }
        if let Some(size) = reply.max_message_size_bytes {
            self.inner
                .max_message_size_bytes
                .store(size, Ordering::SeqCst);
        }

        let use_op_msg = reply.max_wire_version.unwrap_or(0) >= OP_MSG_MIN_WIRE_VERSION;
        self.inner.use_op_msg.store(use_op_msg, Ordering::SeqCst);

        Ok(())
    }

    /// The address this connection is connected to.
    pub fn address(&self) -> &StreamAddress {
        &self.inner.address
    }

    /// Whether an authentication handshake has completed on this connection.
    pub fn is_authenticated(&self) -> bool {
        self.inner.authenticated.load(Ordering::SeqCst)
    }

    /// Gets a handle to a database specified by `name` on this connection.
    ///
    /// This method does not send or receive anything across the wire, so it can be used
    /// repeatedly without incurring any costs from I/O.
    pub fn database(&self, name: &str) -> Database {
        Database::new(self.clone(), name)
    }

    /// Sends `command` and awaits its reply.
    ///
    /// The awaiter is registered before any byte is written; if the caller abandons the
    /// returned future, the registration stays until the server replies (or the
    /// connection dies), at which point the reply is discarded.
    pub async fn send_command(&self, command: Command) -> Result<CommandResponse> {
        let (tx, rx) = oneshot::channel();

        let request_id = {
            let mut in_flight = self.inner.in_flight.lock().unwrap();
            if let Some(ref err) = in_flight.closed {
                return Err(err.clone());
            }
            let id = in_flight.allocate();
            in_flight.pending.insert(id, tx);
            id
        };

        let frame = match self.build_frame(request_id, &command) {
            Ok(frame) => frame,
            Err(err) => {
                // Nothing was written; the registration is simply withdrawn.
                self.inner.in_flight.lock().unwrap().pending.remove(&request_id);
                return Err(err);
            }
        };

        tracing::debug!(
            command = %command.name,
            db = %command.target_db,
            request_id,
            "sending command"
        );

        {
            let mut writer = self.inner.writer.lock().await;
            if let Err(err) = writer.write_all(&frame).await {
                let err = Error::from(err);
                self.inner.shutdown(err.clone());
                return Err(err);
            }
            if let Err(err) = writer.flush().await {
                let err = Error::from(err);
                self.inner.shutdown(err.clone());
                return Err(err);
            }
        }

        match rx.await {
            Ok(result) => result.map(CommandResponse::new),
            Err(_) => Err(self.inner.closed_error()),
        }
    }

    /// Builds and executes `operation`, interpreting the reply.
    pub(crate) async fn execute<T: Operation>(&self, operation: T) -> Result<T::O> {
        let response = self.send_command(operation.build()?).await?;
        operation.handle_response(response)
    }

    /// Runs a raw command against `db`, returning the reply document uninterpreted.
    pub async fn run_command(&self, db: &str, command: Document) -> Result<Document> {
        let name = match command.keys().next() {
            Some(name) => name.to_string(),
            None => {
                return Err(Error::invalid_argument("command document must not be empty"))
            }
        };

        let response = self.send_command(Command::new(name, db, command)).await?;
        Ok(response.raw_response)
    }

    /// Surrenders the given server-side cursors. Failures are logged and swallowed; by
    /// the time this runs there is nobody left to care.
    pub(crate) async fn kill_cursors(&self, ns: Namespace, cursor_ids: Vec<i64>) {
        let operation = KillCursors::new(ns.clone(), cursor_ids.clone());
        if let Err(error) = self.execute(operation).await {
            tracing::debug!(
                namespace = %ns,
                ?cursor_ids,
                %error,
                "failed to kill server-side cursors"
            );
        }
    }

    /// Generates an `ObjectId` from this connection's generator.
    pub(crate) fn generate_object_id(&self) -> ObjectId {
        self.inner.id_generator.generate()
    }

    /// Closes the connection. Every outstanding awaiter is completed with a
    /// connection-closed error, and subsequent commands are rejected.
    pub async fn close(&self) {
        self.inner.shutdown(Error::connection_closed(
            "the connection was closed by the caller",
        ));
        let mut writer = self.inner.writer.lock().await;
        let _ = writer.shutdown().await;
    }

    fn build_frame(&self, request_id: i32, command: &Command) -> Result<Vec<u8>> {
        let max_document_size = self.inner.max_bson_object_size.load(Ordering::SeqCst);
        let mut buf = Vec::new();

        if self.inner.use_op_msg.load(Ordering::SeqCst) {
            let mut body = command.body.clone();
            body.insert("$db", command.target_db.clone());
            let message = Message::new(request_id, body, command.document_sequences.clone());
            message.write_to(&mut buf, max_document_size)?;
        } else {
            let query =
                Query::new_command(request_id, &command.target_db, command.body_with_sequences());
            query.write_to(&mut buf, max_document_size)?;
        }

        Ok(buf)
    }
}

impl ConnectionInner {
    /// Transitions to the terminal state, failing every outstanding awaiter with `err`.
    /// Idempotent: the first terminal error wins.
    fn shutdown(&self, err: Error) {
        let mut in_flight = self.in_flight.lock().unwrap();
        if in_flight.closed.is_none() {
            in_flight.closed = Some(err);
        }
        let closed = in_flight.closed.clone().unwrap();
        for (_, tx) in in_flight.pending.drain() {
            let _ = tx.send(Err(closed.clone()));
        }
    }

    fn closed_error(&self) -> Error {
        self.in_flight
            .lock()
            .unwrap()
            .closed
            .clone()
            .unwrap_or_else(|| Error::connection_closed("the connection was closed"))
    }
}

/// The reader half of the connection: pulls frames off the socket and routes them to
/// their awaiters. Holds only a weak reference so that dropping every `Connection`
/// handle tears the socket down rather than leaking the task.
async fn read_loop(mut reader: OwnedReadHalf, inner: Weak<ConnectionInner>) {
    let err = loop {
        let max_message_size = match inner.upgrade() {
            Some(strong) => strong.max_message_size_bytes.load(Ordering::SeqCst),
            None => return,
        };

        let frame = match WireMessage::read_from(&mut reader, max_message_size).await {
            Ok(frame) => frame,
            Err(err) => break err,
        };

        let strong = match inner.upgrade() {
            Some(strong) => strong,
            None => return,
        };

        let response_to = frame.response_to();
        let result = frame.into_command_reply();

        let tx = strong.in_flight.lock().unwrap().pending.remove(&response_to);
        match tx {
            // A send failure means the awaiter was abandoned; the reply is discarded.
            Some(tx) => {
                let _ = tx.send(result);
            }
            None => {
                tracing::debug!(response_to, "discarding reply with no in-flight request");
            }
        }
    };

    if let Some(strong) = inner.upgrade() {
        tracing::debug!(address = %strong.address, error = %err, "connection reader exiting");
        strong.shutdown(err);
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::InFlight;

    #[test]
    fn request_ids_wrap_to_one() {
        let mut in_flight = InFlight {
            next_request_id: i32::MAX,
            pending: HashMap::new(),
            closed: None,
        };

        assert_eq!(in_flight.allocate(), i32::MAX);
        assert_eq!(in_flight.allocate(), 1);
        assert_eq!(in_flight.allocate(), 2);
    }
}
