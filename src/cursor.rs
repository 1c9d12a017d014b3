//! Lazy document streams over server-side cursors.

use std::{
    collections::VecDeque,
    pin::Pin,
    task::{Context, Poll},
};

use bson::Document;
use futures_core::{future::BoxFuture, Stream};
use futures_util::{FutureExt, StreamExt};

use crate::{
    coll::Namespace,
    conn::Connection,
    error::{ErrorKind, Result},
    operation::GetMore,
    results::GetMoreResult,
};

/// Everything needed to construct a `Cursor` from the `cursor` sub-document of a
/// `find`/`aggregate`/`listCollections` reply.
#[derive(Debug)]
pub(crate) struct CursorSpecification {
    pub(crate) ns: Namespace,
    pub(crate) id: i64,
    pub(crate) initial_batch: Vec<Document>,
    pub(crate) batch_size: Option<u32>,
    pub(crate) limit: Option<i64>,
}

impl CursorSpecification {
    pub(crate) fn new(
        ns: Namespace,
        id: i64,
        initial_batch: Vec<Document>,
        batch_size: Option<u32>,
        limit: Option<i64>,
    ) -> Self {
        Self {
            ns,
            id,
            initial_batch,
            batch_size,
            limit,
        }
    }
}

/// A `Cursor` streams the result of a query. When a query is made, a `Cursor` will be
/// returned with the first batch of results from the server; the documents will be
/// returned as the `Cursor` is iterated. When the batch is exhausted and if there are
/// more results, the `Cursor` will fetch the next batch of documents, and so forth until
/// the results are exhausted. Note that because of this batching, additional network I/O
/// may occur on any given call to `next`. Because of this, a `Cursor` iterates over
/// `Result<Document>` items rather than simply `Document` items.
///
/// The batch size of the `Cursor` can be configured using the options to the method that
/// returns it. For example, setting the `batch_size` field of `FindOptions` will set the
/// batch size of the `Cursor` returned by `Collection::find`.
///
/// A cursor is used like any other [`Stream`](https://docs.rs/futures/latest/futures/stream/trait.Stream.html):
///
/// ```no_run
/// # use bson::doc;
/// # use futures::StreamExt;
/// # use mongowire::{Connection, error::Result, options::{ConnectionOptions, StreamAddress}};
/// # async fn do_stuff() -> Result<()> {
/// # let conn = Connection::connect(
/// #     StreamAddress::new("localhost", None),
/// #     ConnectionOptions::default(),
/// # ).await?;
/// let coll = conn.database("items").collection("in_stock");
/// let mut cursor = coll.find(Some(doc! { "x": 1 }), None).await?;
///
/// while let Some(doc) = cursor.next().await {
///     println!("{}", doc?);
/// }
/// # Ok(())
/// # }
/// ```
///
/// A live cursor owns its server-side state: dropping it before exhaustion sends a
/// single `killCursors` for its id.
pub struct Cursor {
    conn: Connection,
    ns: Namespace,
    id: i64,
    batch_size: Option<u32>,
    /// Documents still owed to the caller under a user-specified limit, if any.
    remaining: Option<i64>,
    buffer: VecDeque<Document>,
    exhausted: bool,
    pending: Option<BoxFuture<'static, Result<GetMoreResult>>>,
}

impl Cursor {
    pub(crate) fn new(conn: Connection, spec: CursorSpecification) -> Self {
        Self {
            conn,
            ns: spec.ns,
            id: spec.id,
            batch_size: spec.batch_size,
            remaining: spec.limit.filter(|limit| *limit > 0),
            buffer: spec.initial_batch.into(),
            exhausted: spec.id == 0,
            pending: None,
        }
    }

    /// The server-side id of this cursor. `0` means the server holds no state for it.
    pub fn id(&self) -> i64 {
        self.id
    }

    /// The namespace the cursor reads from.
    pub fn namespace(&self) -> &Namespace {
        &self.ns
    }

    /// Closes the cursor, surrendering the server-side state via `killCursors` if it is
    /// still live. Errors from the cleanup are logged and swallowed. Idempotent.
    pub async fn close(&mut self) {
        self.exhausted = true;
        self.buffer.clear();
        self.pending = None;

        if self.id != 0 {
            let id = self.id;
            self.id = 0;
            self.conn.kill_cursors(self.ns.clone(), vec![id]).await;
        }
    }

    /// Exhausts the cursor, collecting every remaining document in order.
    pub async fn drain(mut self) -> Result<Vec<Document>> {
        let mut documents = Vec::new();
        while let Some(doc) = self.next().await {
            documents.push(doc?);
        }
        Ok(documents)
    }

    /// The batch size for the next `getMore`: never more than what remains of a
    /// user-specified limit.
    fn next_batch_size(&self) -> Option<u32> {
        match (self.batch_size, self.remaining) {
            (Some(batch_size), Some(remaining)) => {
                Some((batch_size as i64).min(remaining).max(1) as u32)
            }
            (Some(batch_size), None) => Some(batch_size),
            (None, Some(remaining)) => Some(remaining.min(i32::MAX as i64) as u32),
            (None, None) => None,
        }
    }

    /// Hands the live server-side cursor to a background task to be killed. Used where
    /// awaiting is impossible (drop) or where iteration ends mid-batch (limit reached).
    fn spawn_kill(&mut self) {
        if self.id == 0 {
            return;
        }
        let id = self.id;
        self.id = 0;

        let conn = self.conn.clone();
        let ns = self.ns.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    conn.kill_cursors(ns, vec![id]).await;
                });
            }
            Err(_) => {
                tracing::warn!(
                    cursor_id = id,
                    namespace = %ns,
                    "cursor dropped outside an async runtime; the server-side cursor leaks"
                );
            }
        }
    }
}

impl Stream for Cursor {
    type Item = Result<Document>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        loop {
            if let Some(fut) = this.pending.as_mut() {
                let result = match fut.as_mut().poll(cx) {
                    Poll::Pending => return Poll::Pending,
                    Poll::Ready(result) => result,
                };
                this.pending = None;

                match result {
                    Ok(get_more) => {
                        if get_more.exhausted {
                            this.id = 0;
                        }
                        this.buffer = get_more.batch.into();
                    }
                    Err(err) => {
                        this.exhausted = true;
                        if matches!(*err.kind, ErrorKind::CursorClosed) {
                            // The server already disowned the id; nothing left to kill.
                            this.id = 0;
                        }
                        return Poll::Ready(Some(Err(err)));
                    }
                }
            }

            if let Some(doc) = this.buffer.pop_front() {
                if let Some(ref mut remaining) = this.remaining {
                    *remaining -= 1;
                    if *remaining <= 0 {
                        this.buffer.clear();
                        this.exhausted = true;
                        this.spawn_kill();
                    }
                }
                return Poll::Ready(Some(Ok(doc)));
            }

            if this.exhausted || this.id == 0 {
                this.exhausted = true;
                return Poll::Ready(None);
            }

            let operation = GetMore::new(this.ns.clone(), this.id, this.next_batch_size());
            let conn = this.conn.clone();
            this.pending = Some(async move { conn.execute(operation).await }.boxed());
        }
    }
}

impl Drop for Cursor {
    fn drop(&mut self) {
        self.spawn_kill();
    }
}
