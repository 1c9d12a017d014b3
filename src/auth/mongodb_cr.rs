//! The legacy MONGODB-CR challenge-response handshake.

use bson::doc;
use md5::Digest;

use crate::{
    auth::{self, Credential},
    conn::{Command, Connection},
    error::{AuthFailure, Error, Result},
};

const MECHANISM: &str = "MONGODB-CR";

/// Performs MONGODB-CR authentication for a given connection.
pub(crate) async fn authenticate_stream(conn: &Connection, credential: &Credential) -> Result<()> {
    let source = credential.resolved_source().to_string();

    let command = Command::new("getNonce", source.clone(), doc! { "getNonce": 1 });
    let response = conn.send_command(command).await?;
    if !response.is_success() {
        return Err(Error::authentication_error(
            MECHANISM,
            AuthFailure::UnexpectedResponse,
            response
                .raw_response
                .get_str("errmsg")
                .unwrap_or("getNonce failed"),
        ));
    }
    let nonce = response
        .raw_response
        .get_str("nonce")
        .map_err(|_| Error::invalid_authentication_response(MECHANISM))?
        .to_string();

    let key = compute_key(&credential.username, &credential.password, &nonce);

    let command = Command::new(
        "authenticate",
        source,
        doc! {
            "authenticate": 1,
            "nonce": nonce,
            "user": credential.username.clone(),
            "key": key,
        },
    );
    let response = conn.send_command(command).await?;
    if !response.is_success() {
        return Err(Error::authentication_error(
            MECHANISM,
            AuthFailure::IncorrectCredentials,
            response
                .raw_response
                .get_str("errmsg")
                .unwrap_or("authentication failure"),
        ));
    }

    Ok(())
}

/// The challenge response: `md5_hex(nonce + username + md5_hex(user:mongo:password))`.
fn compute_key(username: &str, password: &str, nonce: &str) -> String {
    let digest = auth::mongo_password_digest(username, password);
    let mut md5 = md5::Md5::new();
    md5::Digest::update(&mut md5, format!("{}{}{}", nonce, username, digest));
    hex::encode(md5::Digest::finalize(md5))
}
