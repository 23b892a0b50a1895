//! Streaming over query results.
//!
//! A [`QueryCursor`] hydrates documents one at a time as they are pulled from the
//! backend cursor. Consumers can pull with [`QueryCursor::next`], receive every
//! document in turn with [`QueryCursor::each`], or control the pace themselves with
//! [`QueryCursor::each_with_advance`].
//!
//! In every mode the end of the results is delivered exactly once, as `None`; after
//! that the cursor is closed and any further use fails with
//! [`DocModelError::CursorClosed`].

use futures::{Stream, channel::oneshot, stream};
use tracing::debug;

use crate::{
    backend::BackendCursor,
    error::{DocModelError, DocModelResult},
    instance::Instance,
    model::Model,
};

/// A cursor that yields hydrated instances.
pub struct QueryCursor {
    inner: Box<dyn BackendCursor>,
    model: Model,
    closed: bool,
}

impl QueryCursor {
    pub fn new(inner: Box<dyn BackendCursor>, model: Model) -> Self {
        Self {
            inner,
            model,
            closed: false,
        }
    }

    /// Whether the end of the results has been delivered.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Pulls the next instance, or `None` at the end of the results.
    ///
    /// # Errors
    ///
    /// Returns [`DocModelError::CursorClosed`] once `None` has been returned.
    pub async fn next(&mut self) -> DocModelResult<Option<Instance>> {
        if self.closed {
            return Err(DocModelError::CursorClosed);
        }

        match self.inner.next().await? {
            Some(doc) => Ok(Some(self.model.hydrate(doc))),
            None => {
                self.closed = true;
                Ok(None)
            }
        }
    }

    /// Delivers every remaining instance to `consumer`, then `None`.
    pub async fn each<F>(&mut self, mut consumer: F) -> DocModelResult<()>
    where
        F: FnMut(Option<Instance>) + Send,
    {
        loop {
            let item = self.next().await?;
            let done = item.is_none();

            consumer(item);
            if done {
                return Ok(());
            }
        }
    }

    /// Delivers instances to `consumer` one at a time.
    ///
    /// The next instance is fetched only after the consumer calls [`Advance::next`] on
    /// the handle it was given. Dropping the handle without advancing stops delivery
    /// and leaves the cursor open, so a later call resumes where this one stopped.
    pub async fn each_with_advance<F>(&mut self, mut consumer: F) -> DocModelResult<()>
    where
        F: FnMut(Option<Instance>, Advance) + Send,
    {
        loop {
            let Some(instance) = self.next().await? else {
                consumer(None, Advance { signal: None });
                return Ok(());
            };

            let (signal, advanced) = oneshot::channel();
            consumer(Some(instance), Advance { signal: Some(signal) });

            if advanced.await.is_err() {
                debug!(model = %self.model.name(), "cursor released without advancing");
                return Ok(());
            }
        }
    }

    /// Converts this cursor into a stream of instances.
    ///
    /// The stream ends after the last instance or after the first error.
    pub fn into_stream(self) -> impl Stream<Item = DocModelResult<Instance>> + Send {
        stream::try_unfold(self, |mut cursor| async move {
            Ok(cursor.next().await?.map(|instance| (instance, cursor)))
        })
    }
}

/// Handle passed to an [`each_with_advance`](QueryCursor::each_with_advance) consumer.
#[derive(Debug)]
pub struct Advance {
    signal: Option<oneshot::Sender<()>>,
}

impl Advance {
    /// Requests the next instance.
    pub fn next(mut self) {
        if let Some(signal) = self.signal.take() {
            let _ = signal.send(());
        }
    }
}

#[cfg(test)]
mod tests {
    use bson::doc;
    use futures::TryStreamExt;

    use super::*;
    use crate::{
        backend::VecCursor,
        config::ConnectionOptions,
        connection::Connection,
        schema::{Schema, SchemaType},
        testing::MockBackend,
    };

    fn cursor(count: i32) -> QueryCursor {
        let connection = Connection::new(MockBackend::default(), ConnectionOptions::default());
        let schema = Schema::builder()
            .field("n", SchemaType::Number)
            .build()
            .unwrap();
        let model = connection.model("numbers", schema);
        let documents = (0..count).map(|n| doc! { "n": n }).collect();

        QueryCursor::new(Box::new(VecCursor::new(documents)), model)
    }

    #[tokio::test]
    async fn each_delivers_every_document_then_none_once() {
        let mut cursor = cursor(3);
        let mut seen = Vec::new();

        cursor
            .each(|item| seen.push(item.map(|i| i.get_raw("n").cloned())))
            .await
            .unwrap();

        assert_eq!(seen.len(), 4);
        assert_eq!(seen.last(), Some(&None));
        assert!(cursor.is_closed());
    }

    #[tokio::test]
    async fn exhausted_cursor_is_closed() {
        let mut cursor = cursor(0);

        assert!(cursor.next().await.unwrap().is_none());
        assert!(matches!(cursor.next().await, Err(DocModelError::CursorClosed)));
        assert!(matches!(cursor.each(|_| {}).await, Err(DocModelError::CursorClosed)));
    }

    #[tokio::test]
    async fn manual_advance_paces_delivery() {
        let mut cursor = cursor(3);
        let mut delivered = 0;

        cursor
            .each_with_advance(|item, advance| {
                if item.is_some() {
                    delivered += 1;
                    advance.next();
                }
            })
            .await
            .unwrap();

        assert_eq!(delivered, 3);
        assert!(cursor.is_closed());
    }

    #[tokio::test]
    async fn dropping_the_advance_handle_pauses_the_cursor() {
        let mut cursor = cursor(3);
        let mut delivered = 0;

        cursor
            .each_with_advance(|_, advance| {
                delivered += 1;
                drop(advance);
            })
            .await
            .unwrap();

        assert_eq!(delivered, 1);
        assert!(!cursor.is_closed());
        assert!(cursor.next().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn converts_into_a_stream() {
        let instances = cursor(2).into_stream().try_collect::<Vec<_>>().await.unwrap();

        assert_eq!(instances.len(), 2);
        assert!(instances.iter().all(|i| !i.is_new()));
    }

    #[test]
    fn cursor_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<QueryCursor>();
    }
}
