//! A scripted wire-level mock server: accepts one connection and exchanges real frames
//! over a real socket, letting tests drive both ends of the protocol.

#![allow(dead_code)]

use std::{future::Future, time::Duration};

use bson::{doc, Document};
use mongowire::{
    error::Result,
    options::StreamAddress,
    wire::{
        Message, Query, Reply, WireMessage, DEFAULT_MAX_BSON_OBJECT_SIZE,
        DEFAULT_MAX_MESSAGE_SIZE_BYTES,
    },
};
use tokio::{
    io::AsyncWriteExt,
    net::{TcpListener, TcpStream},
};

/// Awaits `fut`, panicking if it takes suspiciously long. Keeps a misbehaving exchange
/// from hanging the whole suite.
pub async fn with_timeout<F: Future>(fut: F) -> F::Output {
    tokio::time::timeout(Duration::from_secs(10), fut)
        .await
        .expect("exchange timed out")
}

pub struct MockServer {
    listener: TcpListener,
    address: StreamAddress,
}

impl MockServer {
    pub async fn bind() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        Self {
            listener,
            address: StreamAddress::new("127.0.0.1", port),
        }
    }

    pub fn address(&self) -> StreamAddress {
        self.address.clone()
    }

    pub async fn accept(self) -> MockConnection {
        let (stream, _) = self.listener.accept().await.unwrap();
        MockConnection { stream }
    }
}

pub struct MockConnection {
    stream: TcpStream,
}

impl MockConnection {
    /// Reads the next frame off the socket.
    pub async fn read_frame(&mut self) -> Result<WireMessage> {
        WireMessage::read_from(&mut self.stream, DEFAULT_MAX_MESSAGE_SIZE_BYTES).await
    }

    /// Reads the next frame and interprets it as a command, regardless of which path it
    /// traveled: OP_MSG sections are folded into one document, OP_QUERY yields its query
    /// document.
    pub async fn read_command(&mut self) -> (i32, Document) {
        match self.read_frame().await.expect("failed to read command") {
            WireMessage::Message(message) => {
                (message.header.request_id, message.into_document())
            }
            WireMessage::Query(query) => (query.header.request_id, query.query),
            WireMessage::Reply(_) => panic!("client sent an OP_REPLY"),
        }
    }

    /// Replies over OP_MSG.
    pub async fn reply(&mut self, response_to: i32, document: Document) {
        let message = Message::new_reply(next_server_id(), response_to, document);
        let mut buf = Vec::new();
        message
            .write_to(&mut buf, DEFAULT_MAX_BSON_OBJECT_SIZE)
            .unwrap();
        self.stream.write_all(&buf).await.unwrap();
    }

    /// Replies over legacy OP_REPLY, as servers do for OP_QUERY commands.
    pub async fn reply_legacy(&mut self, response_to: i32, document: Document) {
        let reply = Reply::new_command_reply(next_server_id(), response_to, document);
        let mut buf = Vec::new();
        reply.write_to(&mut buf).unwrap();
        self.stream.write_all(&buf).await.unwrap();
    }

    /// Serves the connection handshake: one legacy `isMaster` exchange reporting the
    /// given wire version.
    pub async fn handshake(&mut self, max_wire_version: i32) {
        let (request_id, command) = self.read_command().await;
        assert!(
            command.contains_key("isMaster"),
            "the first exchange on a connection must be isMaster",
        );

        self.reply_legacy(
            request_id,
            doc! {
                "ismaster": true,
                "maxBsonObjectSize": 16 * 1024 * 1024,
                "maxMessageSizeBytes": 48 * 1024 * 1024,
                "maxWireVersion": max_wire_version,
                "minWireVersion": 0,
                "ok": 1,
            },
        )
        .await;
    }

    /// Asserts that the client hangs up without sending another frame.
    pub async fn expect_eof(&mut self) {
        match self.read_frame().await {
            Err(_) => {}
            Ok(frame) => panic!("expected the client to hang up, got {:?}", frame),
        }
    }

    pub fn into_query_parts(frame: WireMessage) -> Query {
        match frame {
            WireMessage::Query(query) => query,
            other => panic!("expected an OP_QUERY frame, got {:?}", other),
        }
    }
}

fn next_server_id() -> i32 {
    use std::sync::atomic::{AtomicI32, Ordering};
    static NEXT: AtomicI32 = AtomicI32::new(1000);
    NEXT.fetch_add(1, Ordering::SeqCst)
}
