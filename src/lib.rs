//! This crate is the core of a pure Rust MongoDB client: a single multiplexed
//! wire-protocol connection with SCRAM-SHA-1 authentication and streaming cursors.
//!
//! To connect to a MongoDB server, dial it with `Connection::connect`:
//!
//! ```no_run
//! # use mongowire::{
//! #     error::Result,
//! #     options::{ConnectionOptions, StreamAddress},
//! #     Connection,
//! # };
//! #
//! # async fn make_connection() -> Result<Connection> {
//! let conn = Connection::connect(
//!     StreamAddress::new("localhost", 27017),
//!     ConnectionOptions::default(),
//! )
//! .await?;
//! # Ok(conn)
//! # }
//! ```
//!
//! Operations are performed by obtaining a `Database` or `Collection` from the
//! `Connection`:
//!
//! ```no_run
//! # use bson::doc;
//! # use mongowire::{error::Result, Connection};
//! #
//! # async fn do_stuff(conn: Connection) -> Result<()> {
//! let db = conn.database("some_db");
//! for coll_name in db.list_collection_names().await? {
//!     println!("collection: {}", coll_name);
//! }
//!
//! let coll = db.collection("some-coll");
//! let result = coll.insert_one(doc! { "x": 1 }).await?;
//! println!("{:#?}", result);
//! # Ok(())
//! # }
//! ```
//!
//! Any number of tasks may share a `Connection` and submit commands concurrently; the
//! connection correlates replies by request id, so the server is free to answer in any
//! order.

pub mod auth;
mod bson_util;
mod coll;
mod command_responses;
mod conn;
mod cursor;
mod db;
pub mod error;
mod oid;
mod operation;
pub mod options;
pub mod results;
pub mod wire;

pub use crate::{
    coll::{Collection, Namespace},
    conn::{Command, CommandResponse, Connection, DRIVER_NAME},
    cursor::Cursor,
    db::Database,
};
