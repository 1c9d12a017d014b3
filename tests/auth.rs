mod common;

use bson::{doc, spec::BinarySubtype, Binary};
use common::{with_timeout, MockServer};
use hmac::{Hmac, Mac};
use md5::{Digest, Md5};
use mongowire::{
    auth::{AuthMechanism, Credential},
    error::{AuthFailure, ErrorKind},
    options::ConnectionOptions,
    Connection,
};
use sha1::Sha1;

fn binary(bytes: impl Into<Vec<u8>>) -> Binary {
    Binary {
        subtype: BinarySubtype::Generic,
        bytes: bytes.into(),
    }
}

fn hmac_sha1(key: &[u8], input: &[u8]) -> Vec<u8> {
    let mut mac = Hmac::<Sha1>::new_from_slice(key).unwrap();
    mac.update(input);
    mac.finalize().into_bytes().to_vec()
}

fn md5_hex(input: &str) -> String {
    let mut md5 = Md5::new();
    md5.update(input);
    hex::encode(md5.finalize())
}

/// The server side of the SCRAM computation, from the RFC 5802 formulas.
struct ScramServer {
    salted_password: Vec<u8>,
    auth_message: String,
}

impl ScramServer {
    fn new(client_nonce: &str, server_nonce: &str, server_first: &str) -> Self {
        let mongo_hash = md5_hex("alice:mongo:hunter2");
        let mut salted_password = vec![0u8; 20];
        pbkdf2::pbkdf2::<Hmac<Sha1>>(mongo_hash.as_bytes(), b"salt", 10, &mut salted_password)
            .unwrap();

        let auth_message = format!(
            "n=alice,r={},{},c=biws,r={}",
            client_nonce, server_first, server_nonce
        );

        Self {
            salted_password,
            auth_message,
        }
    }

    fn expected_proof(&self) -> String {
        let client_key = hmac_sha1(&self.salted_password, b"Client Key");
        let stored_key = {
            let mut sha = Sha1::new();
            Digest::update(&mut sha, &client_key);
            sha.finalize().to_vec()
        };
        let client_signature = hmac_sha1(&stored_key, self.auth_message.as_bytes());
        let proof: Vec<u8> = client_key
            .iter()
            .zip(client_signature.iter())
            .map(|(k, s)| k ^ s)
            .collect();
        base64::encode(proof)
    }

    fn server_signature(&self) -> Vec<u8> {
        let server_key = hmac_sha1(&self.salted_password, b"Server Key");
        hmac_sha1(&server_key, self.auth_message.as_bytes())
    }
}

/// Runs the mock side of a SCRAM-SHA-1 conversation for alice/hunter2, optionally
/// corrupting the server signature.
async fn serve_scram(mock: &mut common::MockConnection, corrupt_signature: bool) {
    // saslStart
    let (request_id, command) = mock.read_command().await;
    assert_eq!(command.get_i32("saslStart").unwrap(), 1);
    assert_eq!(command.get_str("mechanism").unwrap(), "SCRAM-SHA-1");
    assert_eq!(command.get_str("$db").unwrap(), "admin");

    let payload = command.get_binary_generic("payload").unwrap();
    let client_first = std::str::from_utf8(payload).unwrap();
    assert!(client_first.starts_with("n,,n=alice,r="));
    let client_nonce = client_first.rsplit("r=").next().unwrap().to_string();
    assert_eq!(client_nonce.len(), 24);

    let server_nonce = format!("{}srvnonce", client_nonce);
    let server_first = format!("r={},s={},i=10", server_nonce, base64::encode("salt"));
    let scram = ScramServer::new(&client_nonce, &server_nonce, &server_first);

    mock.reply(
        request_id,
        doc! {
            "conversationId": 1,
            "done": false,
            "payload": binary(server_first.as_bytes().to_vec()),
            "ok": 1,
        },
    )
    .await;

    // saslContinue with the client proof
    let (request_id, command) = mock.read_command().await;
    assert_eq!(command.get_i32("saslContinue").unwrap(), 1);
    let payload = command.get_binary_generic("payload").unwrap();
    let client_final = std::str::from_utf8(payload).unwrap();
    assert_eq!(
        client_final,
        format!("c=biws,r={},p={}", server_nonce, scram.expected_proof())
    );

    let mut signature = scram.server_signature();
    if corrupt_signature {
        signature[0] ^= 0x01;
    }
    mock.reply(
        request_id,
        doc! {
            "conversationId": 1,
            "done": false,
            "payload": binary(format!("v={}", base64::encode(signature)).into_bytes()),
            "ok": 1,
        },
    )
    .await;

    if corrupt_signature {
        // The client must abort rather than complete the conversation.
        mock.expect_eof().await;
        return;
    }

    // The final no-op exchange.
    let (request_id, command) = mock.read_command().await;
    let payload = command.get_binary_generic("payload").unwrap();
    assert!(payload.is_empty());
    mock.reply(
        request_id,
        doc! {
            "conversationId": 1,
            "done": true,
            "payload": binary(Vec::new()),
            "ok": 1,
        },
    )
    .await;
}

#[tokio::test]
async fn scram_handshake_succeeds_against_a_correct_server() {
    let server = MockServer::bind().await;
    let address = server.address();

    let server_task = tokio::spawn(async move {
        let mut mock = server.accept().await;
        mock.handshake(8).await;
        serve_scram(&mut mock, false).await;

        let (request_id, _) = mock.read_command().await;
        mock.reply(request_id, doc! { "ok": 1 }).await;
    });

    let options = ConnectionOptions::builder()
        .credential(
            Credential::builder()
                .username("alice")
                .password("hunter2")
                .build(),
        )
        .build();

    let conn = with_timeout(Connection::connect(address, options))
        .await
        .unwrap();
    assert!(conn.is_authenticated());

    // The authenticated connection is immediately usable.
    let reply = with_timeout(conn.database("db").run_command(doc! { "ping": 1 }))
        .await
        .unwrap();
    assert_eq!(reply, doc! { "ok": 1 });

    server_task.await.unwrap();
}

#[tokio::test]
async fn flipped_server_signature_bit_is_rejected() {
    let server = MockServer::bind().await;
    let address = server.address();

    let server_task = tokio::spawn(async move {
        let mut mock = server.accept().await;
        mock.handshake(8).await;
        serve_scram(&mut mock, true).await;
    });

    let options = ConnectionOptions::builder()
        .credential(
            Credential::builder()
                .username("alice")
                .password("hunter2")
                .build(),
        )
        .build();

    let err = with_timeout(Connection::connect(address, options))
        .await
        .unwrap_err();
    match *err.kind {
        ErrorKind::Authentication { failure, .. } => {
            assert_eq!(failure, AuthFailure::ServerSignature);
        }
        ref other => panic!("expected an authentication error, got {:?}", other),
    }

    server_task.await.unwrap();
}

#[tokio::test]
async fn rejected_credentials_surface_as_incorrect_credentials() {
    let server = MockServer::bind().await;
    let address = server.address();

    let server_task = tokio::spawn(async move {
        let mut mock = server.accept().await;
        mock.handshake(8).await;

        let (request_id, command) = mock.read_command().await;
        assert_eq!(command.get_i32("saslStart").unwrap(), 1);
        mock.reply(
            request_id,
            doc! { "ok": 0, "code": 18, "errmsg": "Authentication failed." },
        )
        .await;
        mock.expect_eof().await;
    });

    let options = ConnectionOptions::builder()
        .credential(
            Credential::builder()
                .username("alice")
                .password("wrong")
                .build(),
        )
        .build();

    let err = with_timeout(Connection::connect(address, options))
        .await
        .unwrap_err();
    match *err.kind {
        ErrorKind::Authentication { failure, .. } => {
            assert_eq!(failure, AuthFailure::IncorrectCredentials);
        }
        ref other => panic!("expected an authentication error, got {:?}", other),
    }

    server_task.await.unwrap();
}

#[tokio::test]
async fn mongodb_cr_handshake_derives_the_challenge_key() {
    let server = MockServer::bind().await;
    let address = server.address();

    let server_task = tokio::spawn(async move {
        let mut mock = server.accept().await;
        // MONGODB-CR belongs to the pre-OP_MSG era.
        mock.handshake(5).await;

        let (request_id, command) = mock.read_command().await;
        assert_eq!(command.get_i32("getNonce").unwrap(), 1);
        mock.reply_legacy(request_id, doc! { "nonce": "abc123", "ok": 1 })
            .await;

        let (request_id, command) = mock.read_command().await;
        assert_eq!(command.get_i32("authenticate").unwrap(), 1);
        assert_eq!(command.get_str("user").unwrap(), "alice");
        assert_eq!(command.get_str("nonce").unwrap(), "abc123");

        let digest = md5_hex("alice:mongo:hunter2");
        let expected_key = md5_hex(&format!("abc123alice{}", digest));
        assert_eq!(command.get_str("key").unwrap(), expected_key);

        mock.reply_legacy(request_id, doc! { "ok": 1 }).await;
    });

    let options = ConnectionOptions::builder()
        .credential(
            Credential::builder()
                .username("alice")
                .password("hunter2")
                .mechanism(AuthMechanism::MongoDbCr)
                .build(),
        )
        .build();

    let conn = with_timeout(Connection::connect(address, options))
        .await
        .unwrap();
    assert!(conn.is_authenticated());

    server_task.await.unwrap();
}
