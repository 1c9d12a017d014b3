use std::sync::Arc;

use bson::{Bson, Document};

use crate::{
    coll::Collection,
    conn::Connection,
    cursor::Cursor,
    error::Result,
    operation::{CreateUser, ListCollections, UsersInfo},
    options::ListCollectionsOptions,
};

/// `Database` is the client-side abstraction of a MongoDB database. It can be used to
/// perform database-level operations or to obtain handles to specific collections within
/// the database. A `Database` can only be obtained through a
/// [`Connection`](struct.Connection.html) by calling
/// [`Connection::database`](struct.Connection.html#method.database).
///
/// `Database` uses [`std::sync::Arc`](https://doc.rust-lang.org/std/sync/struct.Arc.html)
/// internally, so it can safely be shared across threads or async tasks.
#[derive(Clone, Debug)]
pub struct Database {
    inner: Arc<DatabaseInner>,
}

#[derive(Debug)]
struct DatabaseInner {
    conn: Connection,
    name: String,
}

impl Database {
    pub(crate) fn new(conn: Connection, name: &str) -> Self {
        Self {
            inner: Arc::new(DatabaseInner {
                conn,
                // Database names cannot contain a '.'.
                name: name.replace('.', ""),
            }),
        }
    }

    /// Gets the `Connection` this database handle descended from.
    pub(crate) fn connection(&self) -> &Connection {
        &self.inner.conn
    }

    /// Gets the name of the `Database`.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Gets a handle to a collection specified by `name` of the database.
    ///
    /// This method does not send or receive anything across the wire to the database, so
    /// it can be used repeatedly without incurring any costs from I/O.
    pub fn collection(&self, name: &str) -> Collection {
        Collection::new(self.clone(), name)
    }

    /// Runs a database-level command, returning the reply document uninterpreted.
    ///
    /// Note that no inspection is done on the reply, so the `ok` field must be checked by
    /// the caller where it matters.
    pub async fn run_command(&self, command: Document) -> Result<Document> {
        self.connection().run_command(self.name(), command).await
    }

    /// Gets information about each of the collections in the database, as a cursor over
    /// their info documents.
    pub async fn list_collections(
        &self,
        filter: Option<Document>,
        options: Option<ListCollectionsOptions>,
    ) -> Result<Cursor> {
        let operation = ListCollections::new(self.name().to_string(), filter, false, options);
        let spec = self.connection().execute(operation).await?;
        Ok(Cursor::new(self.connection().clone(), spec))
    }

    /// Gets the names of the collections of the database.
    pub async fn list_collection_names(&self) -> Result<Vec<String>> {
        let operation = ListCollections::new(self.name().to_string(), None, true, None);
        let spec = self.connection().execute(operation).await?;
        let cursor = Cursor::new(self.connection().clone(), spec);

        cursor
            .drain()
            .await?
            .into_iter()
            .map(|doc| {
                doc.get_str("name").map(String::from).map_err(|_| {
                    crate::error::Error::protocol(
                        "collection info document is missing its name",
                    )
                })
            })
            .collect()
    }

    /// Creates a user with the given roles on this database.
    pub async fn create_user(
        &self,
        name: &str,
        password: Option<&str>,
        roles: Vec<Bson>,
    ) -> Result<()> {
        let operation = CreateUser::new(
            self.name().to_string(),
            name.to_string(),
            password.map(String::from),
            roles,
        );
        self.connection().execute(operation).await
    }

    /// Looks up user documents. `target` follows the server's `usersInfo` shapes: a
    /// username, a `{ user, db }` document, an array of either, or `1` for all users of
    /// this database.
    pub async fn users_info(&self, target: impl Into<Bson>) -> Result<Vec<Document>> {
        let operation = UsersInfo::new(self.name().to_string(), target.into());
        self.connection().execute(operation).await
    }
}
