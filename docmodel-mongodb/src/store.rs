use async_trait::async_trait;
use futures::TryStreamExt;
use bson::{Document, doc};
use mea::rwlock::RwLock;
use mongodb::{
    Client, Collection as MongoCollection, Cursor,
    options::{ClientOptions, Credential},
};
use std::sync::Arc;
use tracing::{debug, info};

use docmodel_core::{
    backend::{
        BackendCollection, BackendCursor, RemoveOptions, StoreBackend, StoreBackendBuilder,
        UpdateOptions, acknowledgement,
    },
    config::ConnectionOptions,
    error::{DocModelError, DocModelResult},
    query::QueryOptions,
};

use crate::options::{find_one_options, find_options};

fn driver(error: mongodb::error::Error) -> DocModelError {
    DocModelError::Driver(error.to_string())
}

#[derive(Debug, Clone)]
struct Session {
    client: Client,
    options: ClientOptions,
    database: String,
}

impl Session {
    async fn connect(options: ClientOptions, database: String) -> DocModelResult<Self> {
        let client = Client::with_options(options.clone()).map_err(driver)?;

        client
            .database(&database)
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(driver)?;

        Ok(Self { client, options, database })
    }
}

#[derive(Debug, Default)]
struct MongoState {
    session: RwLock<Option<Session>>,
    app_name: Option<String>,
}

impl MongoState {
    async fn collection(&self, name: &str) -> DocModelResult<MongoCollection<Document>> {
        match &*self.session.read().await {
            Some(session) => Ok(session.client.database(&session.database).collection(name)),
            None => Err(DocModelError::ConnectionState(format!(
                "no open MongoDB session for collection \"{name}\""
            ))),
        }
    }
}

/// A backend talking to a MongoDB deployment through the official driver.
///
/// The driver client is created when the connection opens and dropped when it
/// closes, so a store can be handed to a [`Connection`](docmodel_core::connection::Connection)
/// before the server is reachable.
#[derive(Debug, Clone, Default)]
pub struct MongoDbStore {
    state: Arc<MongoState>,
}

impl MongoDbStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> MongoDbStoreBuilder {
        MongoDbStoreBuilder::default()
    }
}

#[async_trait]
impl StoreBackend for MongoDbStore {
    async fn open(&self, options: &ConnectionOptions) -> DocModelResult<()> {
        let uri = options.connection_string();
        let mut client_options = ClientOptions::parse(&uri).await.map_err(driver)?;
        if let Some(app_name) = &self.state.app_name {
            client_options.app_name = Some(app_name.clone());
        }

        let session = Session::connect(client_options, options.database.clone()).await?;
        *self.state.session.write().await = Some(session);
        info!(host = %options.host, port = options.port, database = %options.database, "connected to MongoDB");

        Ok(())
    }

    async fn close(&self) -> DocModelResult<()> {
        let session = self.state.session.write().await.take();

        if let Some(session) = session {
            session.client.shutdown().await;
            info!(database = %session.database, "disconnected from MongoDB");
        }

        Ok(())
    }

    async fn authenticate(&self, user: &str, password: &str) -> DocModelResult<()> {
        let mut guard = self.state.session.write().await;
        let Some(current) = guard.as_ref() else {
            return Err(DocModelError::ConnectionState("cannot authenticate before opening".to_string()));
        };

        let mut options = current.options.clone();
        options.credential = Some(
            Credential::builder()
                .username(user.to_string())
                .password(password.to_string())
                .source(current.database.clone())
                .build()
        );

        let authenticated = Session::connect(options, current.database.clone()).await?;
        if let Some(previous) = guard.replace(authenticated) {
            previous.client.shutdown().await;
        }
        debug!(user, "authenticated against MongoDB");

        Ok(())
    }

    fn collection(&self, name: &str) -> Arc<dyn BackendCollection> {
        Arc::new(MongoDbCollection {
            name: name.to_string(),
            state: Arc::clone(&self.state),
        })
    }
}

struct MongoDbCollection {
    name: String,
    state: Arc<MongoState>,
}

#[async_trait]
impl BackendCollection for MongoDbCollection {
    async fn find(&self, conditions: Document, options: QueryOptions) -> DocModelResult<Box<dyn BackendCursor>> {
        let cursor = self.state
            .collection(&self.name)
            .await?
            .find(conditions)
            .with_options(find_options(&options))
            .await
            .map_err(driver)?;

        Ok(Box::new(MongoCursor { inner: cursor }))
    }

    async fn find_one(&self, conditions: Document, options: QueryOptions) -> DocModelResult<Option<Document>> {
        self.state
            .collection(&self.name)
            .await?
            .find_one(conditions)
            .with_options(find_one_options(&options))
            .await
            .map_err(driver)
    }

    async fn insert(&self, documents: Vec<Document>) -> DocModelResult<Document> {
        let result = self.state
            .collection(&self.name)
            .await?
            .insert_many(documents)
            .await
            .map_err(driver)?;

        Ok(acknowledgement(result.inserted_ids.len() as u64))
    }

    async fn update(&self, conditions: Document, changes: Document, options: UpdateOptions) -> DocModelResult<Document> {
        let collection = self.state.collection(&self.name).await?;

        let result = if options.multi {
            collection
                .update_many(conditions, changes)
                .upsert(options.upsert)
                .await
        } else {
            collection
                .update_one(conditions, changes)
                .upsert(options.upsert)
                .await
        }
        .map_err(driver)?;

        let upserted = result.upserted_id.is_some() as u64;
        let mut ack = acknowledgement(result.matched_count + upserted);
        ack.insert("nModified", result.modified_count as i64);
        if let Some(id) = result.upserted_id {
            ack.insert("upserted", id);
        }

        Ok(ack)
    }

    async fn remove(&self, conditions: Document, options: RemoveOptions) -> DocModelResult<Document> {
        let collection = self.state.collection(&self.name).await?;

        let result = if options.just_one {
            collection.delete_one(conditions).await
        } else {
            collection.delete_many(conditions).await
        }
        .map_err(driver)?;

        Ok(acknowledgement(result.deleted_count))
    }

    async fn count(&self, conditions: Document) -> DocModelResult<u64> {
        self.state
            .collection(&self.name)
            .await?
            .count_documents(conditions)
            .await
            .map_err(driver)
    }
}

/// Pulls documents from a driver cursor one at a time.
struct MongoCursor {
    inner: Cursor<Document>,
}

#[async_trait]
impl BackendCursor for MongoCursor {
    async fn next(&mut self) -> DocModelResult<Option<Document>> {
        self.inner.try_next().await.map_err(driver)
    }
}

/// Builder for [`MongoDbStore`].
///
/// # Example
///
/// ```ignore
/// use docmodel::{backend::StoreBackendBuilder, mongodb::MongoDbStore};
///
/// let store = MongoDbStore::builder().app_name("blog").build().await?;
/// ```
#[derive(Debug, Default)]
pub struct MongoDbStoreBuilder {
    app_name: Option<String>,
}

impl MongoDbStoreBuilder {
    /// Application name reported to the server in the connection handshake.
    pub fn app_name(mut self, app_name: impl Into<String>) -> Self {
        self.app_name = Some(app_name.into());
        self
    }
}

#[async_trait]
impl StoreBackendBuilder for MongoDbStoreBuilder {
    type Backend = MongoDbStore;

    async fn build(self) -> DocModelResult<Self::Backend> {
        Ok(MongoDbStore {
            state: Arc::new(MongoState {
                session: RwLock::new(None),
                app_name: self.app_name,
            }),
        })
    }
}
