use std::{fmt, time::Duration};

use async_trait::async_trait;
use bson::{Bson, Document, doc};
use futures::{TryStreamExt, future::LocalBoxFuture};
use mongodb::{
    Client, Collection as MongoCollection, IndexModel,
    options::{
        Acknowledgment, ClientOptions, Credential, DeleteOneModel, FindOneAndUpdateOptions, FindOptions,
        InsertOneModel, ReplaceOneModel, ReturnDocument, UpdateModifications, UpdateOneModel, UpdateOptions,
        WriteConcern, WriteModel,
    },
};
use once_cell::sync::OnceCell;
use tokio::runtime::{Handle, RuntimeFlavor};

use docbridge_core::{
    backend::{StoreBackend, StoreBackendBuilder},
    constraints::ReadOptions,
    error::{DocumentStoreError, DocumentStoreResult},
    multi_writer::WriteIntent,
    query::Fragments,
    registry::{self, Registrar},
    result::DatabaseResult,
};

use crate::query::{compile_array_filters, compile_filter, compile_update};

const DEFAULT_HOST: &str = "localhost";
const DEFAULT_PORT: u16 = 27017;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// First wire version with the client-level `bulkWrite` command (MongoDB 8.0).
const CLIENT_BULK_WRITE_WIRE_VERSION: i32 = 25;

/// MongoDB backend.
///
/// Holds the handle of the Tokio runtime the client was created on. The blocking collection forms
/// run there: directly when called outside of any runtime, through `block_in_place` from a
/// multi-threaded runtime worker. They fail from a current-thread runtime, which cannot be
/// blocked without stalling the driver.
#[derive(Debug)]
pub struct MongoDbStore {
    client: Client,
    database: String,
    runtime: Handle,
    acknowledged: bool,
    client_bulk_write: OnceCell<bool>,
}

impl MongoDbStore {
    pub fn new(client: Client, database: String, runtime: Handle) -> Self {
        let acknowledged = acknowledges(client.database(&database).write_concern());

        Self { client, database, runtime, acknowledged, client_bulk_write: OnceCell::new() }
    }

    /// Starts a builder for the database `database` on `dsn`.
    pub fn builder(dsn: &str, database: &str) -> MongoDbStoreBuilder {
        MongoDbStoreBuilder::new(dsn, database)
    }

    fn get_collection(&self, collection_name: &str) -> MongoCollection<Document> {
        self.client
            .database(&self.database)
            .collection(collection_name)
    }

    /// Compiles the filter, update and array-filter documents of `fragments`.
    fn compile(
        &self,
        fragments: &Fragments,
        collection: &str,
    ) -> DocumentStoreResult<(Document, Document, Option<Vec<Document>>)> {
        let filter = compile_filter(fragments)?;
        let update = compile_update(fragments.updates())?;
        let array_filters = compile_array_filters(fragments.array_filters());

        tracing::debug!(
            target: "docbridge::mongodb",
            collection,
            filter = %filter,
            update = %update,
            array_filters = array_filters.as_ref().map_or(0, Vec::len),
            "compiled update"
        );

        Ok((filter, update, array_filters))
    }

    /// The result of a write under the configured write concern.
    fn outcome(&self, items_affected: u64) -> DatabaseResult {
        if self.acknowledged {
            DatabaseResult::acknowledged(items_affected)
        } else {
            DatabaseResult::unacknowledged()
        }
    }

    /// Whether the server speaks the client-level `bulkWrite` command. Remembered once known.
    async fn supports_client_bulk_write(&self) -> bool {
        if let Some(supported) = self.client_bulk_write.get() {
            return *supported;
        }

        match self.client.database(&self.database).run_command(doc! { "hello": 1 }).await {
            Ok(reply) => {
                let supported = speaks_client_bulk_write(&reply);
                let _ = self.client_bulk_write.set(supported);
                supported
            }
            Err(err) => {
                tracing::debug!(target: "docbridge::mongodb", error = %err, "hello failed; writing batch in order");
                false
            }
        }
    }

    /// Runs the intents one by one against the collection, stopping at the first failure.
    async fn write_in_order(
        &self,
        intents: Vec<WriteIntent<Document>>,
        collection: &str,
    ) -> DocumentStoreResult<DatabaseResult> {
        let target = self.get_collection(collection);
        let mut items_affected = 0;

        for intent in intents {
            items_affected += match intent {
                WriteIntent::Create { document } => {
                    target
                        .insert_one(document)
                        .await
                        .map_err(|e| DocumentStoreError::Backend(e.to_string()))?;
                    0
                }
                WriteIntent::Update { fragments } => {
                    let (filter, update, array_filters) = self.compile(&fragments, collection)?;
                    let mut options = UpdateOptions::default();
                    options.array_filters = array_filters;

                    target
                        .update_one(filter, update)
                        .with_options(options)
                        .await
                        .map_err(|e| DocumentStoreError::Backend(e.to_string()))?
                        .modified_count
                }
                WriteIntent::Replace { filter, document } => {
                    target
                        .replace_one(compile_filter(&filter)?, document)
                        .await
                        .map_err(|e| DocumentStoreError::Backend(e.to_string()))?
                        .modified_count
                }
                WriteIntent::Delete { filter } => {
                    target
                        .delete_one(compile_filter(&filter)?)
                        .await
                        .map_err(|e| DocumentStoreError::Backend(e.to_string()))?
                        .deleted_count
                }
            };
        }

        Ok(self.outcome(items_affected))
    }

    fn write_model(
        &self,
        intent: WriteIntent<Document>,
        target: &MongoCollection<Document>,
    ) -> DocumentStoreResult<WriteModel> {
        Ok(match intent {
            WriteIntent::Create { document } => WriteModel::InsertOne(
                InsertOneModel::builder()
                    .namespace(target.namespace())
                    .document(document)
                    .build(),
            ),
            WriteIntent::Update { fragments } => {
                let (filter, update, array_filters) = self.compile(&fragments, target.name())?;
                let mut model = UpdateOneModel::builder()
                    .namespace(target.namespace())
                    .filter(filter)
                    .update(UpdateModifications::Document(update))
                    .build();
                model.array_filters = array_filters.map(|filters| filters.into_iter().map(Bson::Document).collect());

                WriteModel::UpdateOne(model)
            }
            WriteIntent::Replace { filter, document } => WriteModel::ReplaceOne(
                ReplaceOneModel::builder()
                    .namespace(target.namespace())
                    .filter(compile_filter(&filter)?)
                    .replacement(document)
                    .build(),
            ),
            WriteIntent::Delete { filter } => WriteModel::DeleteOne(
                DeleteOneModel::builder()
                    .namespace(target.namespace())
                    .filter(compile_filter(&filter)?)
                    .build(),
            ),
        })
    }
}

fn affected(value: i64) -> u64 {
    u64::try_from(value).unwrap_or_default()
}

/// Reads the `maxWireVersion` of a `hello` reply.
fn speaks_client_bulk_write(hello: &Document) -> bool {
    match hello.get("maxWireVersion") {
        Some(Bson::Int32(version)) => *version >= CLIENT_BULK_WRITE_WIRE_VERSION,
        Some(Bson::Int64(version)) => *version >= i64::from(CLIENT_BULK_WRITE_WIRE_VERSION),
        _ => false,
    }
}

/// `false` only for an explicit `w: 0` write concern.
fn acknowledges(write_concern: Option<&WriteConcern>) -> bool {
    !matches!(
        write_concern.and_then(|concern| concern.w.as_ref()),
        Some(Acknowledgment::Nodes(0))
    )
}

#[async_trait]
impl StoreBackend for MongoDbStore {
    async fn find(
        &self,
        filter: &Fragments,
        options: &ReadOptions,
        collection: &str,
    ) -> DocumentStoreResult<Vec<Document>> {
        let mut find_options = FindOptions::default();
        find_options.sort = options.sort.clone();
        find_options.skip = options.skip;
        find_options.limit = options.limit;
        find_options.projection = options.projection.clone();

        let filter = compile_filter(filter)?;
        tracing::debug!(target: "docbridge::mongodb", collection, filter = %filter, "find");

        self.get_collection(collection)
            .find(filter)
            .with_options(find_options)
            .await
            .map_err(|e| DocumentStoreError::Backend(e.to_string()))?
            .try_collect::<Vec<Document>>()
            .await
            .map_err(|e| DocumentStoreError::Backend(e.to_string()))
    }

    async fn count(&self, collection: &str) -> DocumentStoreResult<u64> {
        self.get_collection(collection)
            .count_documents(doc! {})
            .await
            .map_err(|e| DocumentStoreError::Backend(e.to_string()))
    }

    async fn insert_one(&self, document: Document, collection: &str) -> DocumentStoreResult<()> {
        self.get_collection(collection)
            .insert_one(document)
            .await
            .map_err(|e| DocumentStoreError::Backend(e.to_string()))?;

        Ok(())
    }

    async fn replace_one(
        &self,
        filter: &Fragments,
        document: Document,
        collection: &str,
    ) -> DocumentStoreResult<DatabaseResult> {
        let result = self
            .get_collection(collection)
            .replace_one(compile_filter(filter)?, document)
            .await
            .map_err(|e| DocumentStoreError::Backend(e.to_string()))?;

        Ok(self.outcome(result.modified_count))
    }

    async fn update_one(&self, fragments: &Fragments, collection: &str) -> DocumentStoreResult<DatabaseResult> {
        let (filter, update, array_filters) = self.compile(fragments, collection)?;

        let mut options = UpdateOptions::default();
        options.upsert = Some(true);
        options.array_filters = array_filters;

        let result = self
            .get_collection(collection)
            .update_one(filter, update)
            .with_options(options)
            .await
            .map_err(|e| DocumentStoreError::Backend(e.to_string()))?;

        Ok(self.outcome(result.modified_count))
    }

    async fn find_one_and_update(
        &self,
        fragments: &Fragments,
        collection: &str,
    ) -> DocumentStoreResult<Option<Document>> {
        let (filter, update, array_filters) = self.compile(fragments, collection)?;

        let mut options = FindOneAndUpdateOptions::default();
        options.upsert = Some(true);
        options.return_document = Some(ReturnDocument::Before);
        options.array_filters = array_filters;

        self.get_collection(collection)
            .find_one_and_update(filter, update)
            .with_options(options)
            .await
            .map_err(|e| DocumentStoreError::Backend(e.to_string()))
    }

    async fn delete_one(&self, filter: &Fragments, collection: &str) -> DocumentStoreResult<DatabaseResult> {
        let result = self
            .get_collection(collection)
            .delete_one(compile_filter(filter)?)
            .await
            .map_err(|e| DocumentStoreError::Backend(e.to_string()))?;

        Ok(self.outcome(result.deleted_count))
    }

    /// Sends the batch as one client-level `bulkWrite` on MongoDB 8.0 and later. Older servers
    /// get the intents one at a time, in order.
    async fn bulk_write(
        &self,
        intents: Vec<WriteIntent<Document>>,
        collection: &str,
    ) -> DocumentStoreResult<DatabaseResult> {
        if !self.supports_client_bulk_write().await {
            return self.write_in_order(intents, collection).await;
        }

        let target = self.get_collection(collection);
        let models = intents
            .into_iter()
            .map(|intent| self.write_model(intent, &target))
            .collect::<DocumentStoreResult<Vec<WriteModel>>>()?;

        tracing::debug!(target: "docbridge::mongodb", collection, models = models.len(), "bulk write");

        let result = self
            .client
            .bulk_write(models)
            .await
            .map_err(|e| DocumentStoreError::Backend(e.to_string()))?;

        Ok(self.outcome(affected(result.modified_count) + affected(result.deleted_count)))
    }

    async fn create_index(&self, field: &str, collection: &str) -> DocumentStoreResult<String> {
        Ok(self
            .get_collection(collection)
            .create_index(IndexModel::builder().keys(doc! { field: 1 }).build())
            .await
            .map_err(|e| DocumentStoreError::Backend(e.to_string()))?
            .index_name)
    }

    async fn drop_collection(&self, collection: &str) -> DocumentStoreResult<()> {
        self.get_collection(collection)
            .drop()
            .await
            .map_err(|e| DocumentStoreError::Backend(e.to_string()))?;

        Ok(())
    }

    async fn shutdown(&self) -> DocumentStoreResult<()> {
        self.client.clone().shutdown().await;

        Ok(())
    }

    fn block_on(&self, future: LocalBoxFuture<'_, ()>) {
        match Handle::try_current() {
            Err(_) => self.runtime.block_on(future),
            Ok(current) if current.runtime_flavor() == RuntimeFlavor::MultiThread => {
                tokio::task::block_in_place(|| self.runtime.block_on(future))
            }
            Ok(_) => {
                tracing::warn!(target: "docbridge::mongodb", "blocking call refused on a current-thread runtime");
            }
        }
    }
}

type RegistrationHook = Box<dyn FnOnce(&mut Registrar<'_>) + Send>;

/// Builder for [`MongoDbStore`].
///
/// Credentials authenticate against the target database. Connecting fails after 5 seconds.
///
/// ```ignore
/// let backend = MongoDbStore::builder("mongodb://db.internal:27017", "shop")
///     .app_name("billing")
///     .credentials("billing", "secret")
///     .on_initialize(|registrar| {
///         registrar.register_convention_pack("keys", vec![Convention::EscapeReservedKeys]);
///     })
///     .build()
///     .await?;
/// ```
pub struct MongoDbStoreBuilder {
    dsn: String,
    database: String,
    app_name: Option<String>,
    credentials: Option<(String, String)>,
    direct_connection: bool,
    connect_timeout: Duration,
    runtime: Option<Handle>,
    on_initialize: Option<RegistrationHook>,
}

impl MongoDbStoreBuilder {
    pub fn new(dsn: &str, database: &str) -> Self {
        Self {
            dsn: dsn.to_string(),
            database: database.to_string(),
            app_name: None,
            credentials: None,
            direct_connection: false,
            connect_timeout: CONNECT_TIMEOUT,
            runtime: None,
            on_initialize: None,
        }
    }

    /// Connects to a single host instead of a connection string. `None` falls back to
    /// `localhost:27017`.
    pub fn from_host(host: Option<&str>, port: Option<u16>, database: &str) -> Self {
        let dsn = format!(
            "mongodb://{}:{}",
            host.unwrap_or(DEFAULT_HOST),
            port.unwrap_or(DEFAULT_PORT)
        );

        Self::new(&dsn, database)
    }

    pub fn app_name(mut self, app_name: impl Into<String>) -> Self {
        self.app_name = Some(app_name.into());
        self
    }

    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Some((username.into(), password.into()));
        self
    }

    pub fn direct_connection(mut self, direct: bool) -> Self {
        self.direct_connection = direct;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// The runtime the client lives on. Defaults to the runtime `build` is awaited on.
    pub fn runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Registers field codecs and convention packs before the first document is exchanged.
    ///
    /// The hook only runs if no other caller initialized the registry first.
    pub fn on_initialize<F>(mut self, hook: F) -> Self
    where
        F: FnOnce(&mut Registrar<'_>) + Send + 'static,
    {
        self.on_initialize = Some(Box::new(hook));
        self
    }

    fn client_options(&self, mut options: ClientOptions) -> ClientOptions {
        if let Some(app_name) = &self.app_name {
            options.app_name = Some(app_name.clone());
        }
        if let Some((username, password)) = &self.credentials {
            options.credential = Some(
                Credential::builder()
                    .username(username.clone())
                    .password(password.clone())
                    .source(self.database.clone())
                    .build(),
            );
        }
        if self.direct_connection {
            options.direct_connection = Some(true);
        }
        options.connect_timeout = Some(self.connect_timeout);

        options
    }
}

impl fmt::Debug for MongoDbStoreBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MongoDbStoreBuilder")
            .field("dsn", &self.dsn)
            .field("database", &self.database)
            .field("app_name", &self.app_name)
            .field("username", &self.credentials.as_ref().map(|(username, _)| username))
            .field("password", &self.credentials.as_ref().map(|_| "<redacted>"))
            .field("direct_connection", &self.direct_connection)
            .field("connect_timeout", &self.connect_timeout)
            .field("runtime", &self.runtime.as_ref().map(Handle::runtime_flavor))
            .field("on_initialize", &self.on_initialize.is_some())
            .finish()
    }
}

#[async_trait]
impl StoreBackendBuilder for MongoDbStoreBuilder {
    type Backend = MongoDbStore;

    async fn build(mut self) -> DocumentStoreResult<Self::Backend> {
        if let Some(hook) = self.on_initialize.take() {
            if !registry::initialize(hook) {
                tracing::debug!(target: "docbridge::mongodb", "registry already initialized; hook skipped");
            }
        }

        let runtime = match self.runtime.take() {
            Some(runtime) => runtime,
            None => Handle::try_current().map_err(|e| DocumentStoreError::Initialization(e.to_string()))?,
        };

        let dsn = self.dsn.clone();
        let parsed = ClientOptions::parse(&dsn)
            .await
            .map_err(|e| DocumentStoreError::Initialization(e.to_string()))?;
        let options = self.client_options(parsed);

        tracing::debug!(
            target: "docbridge::mongodb",
            hosts = ?options.hosts,
            database = %self.database,
            "connecting"
        );

        let client = {
            let _entered = runtime.enter();
            Client::with_options(options).map_err(|e| DocumentStoreError::Initialization(e.to_string()))?
        };

        Ok(MongoDbStore::new(client, self.database, runtime))
    }
}

#[cfg(test)]
mod tests {
    use docbridge_core::store::DocumentStore;

    use super::*;

    /// Nothing listens there; server selection gives up quickly.
    const UNREACHABLE: &str = "mongodb://127.0.0.1:1/?serverSelectionTimeoutMS=200&directConnection=true";

    #[test]
    fn host_defaults_to_localhost() {
        let builder = MongoDbStoreBuilder::from_host(None, None, "shop");
        assert_eq!(builder.dsn, "mongodb://localhost:27017");

        let builder = MongoDbStoreBuilder::from_host(Some("db"), Some(27018), "shop");
        assert_eq!(builder.dsn, "mongodb://db:27018");
    }

    #[test]
    fn debug_output_redacts_the_password() {
        let builder = MongoDbStoreBuilder::new("mongodb://localhost", "shop").credentials("app", "hunter2");
        let rendered = format!("{builder:?}");

        assert!(rendered.contains("app"));
        assert!(rendered.contains("<redacted>"));
        assert!(!rendered.contains("hunter2"));
    }

    #[test]
    fn client_options_carry_the_builder_settings() {
        let builder = MongoDbStoreBuilder::new("mongodb://localhost", "shop")
            .app_name("billing")
            .credentials("app", "secret")
            .direct_connection(true);

        let options = builder.client_options(ClientOptions::default());
        assert_eq!(options.app_name.as_deref(), Some("billing"));
        assert_eq!(options.direct_connection, Some(true));
        assert_eq!(options.connect_timeout, Some(Duration::from_secs(5)));
        assert_eq!(
            options.credential.and_then(|credential| credential.source),
            Some("shop".to_string())
        );
    }

    #[test]
    fn client_bulk_write_needs_wire_version_25() {
        assert!(speaks_client_bulk_write(&doc! { "isWritablePrimary": true, "maxWireVersion": 25 }));
        assert!(speaks_client_bulk_write(&doc! { "maxWireVersion": 27_i64 }));
        assert!(!speaks_client_bulk_write(&doc! { "maxWireVersion": 21 }));
        assert!(!speaks_client_bulk_write(&doc! { "ok": 1 }));
    }

    #[test]
    fn only_an_explicit_zero_write_concern_is_unacknowledged() {
        let nodes = |count| WriteConcern::builder().w(Acknowledgment::Nodes(count)).build();

        assert!(acknowledges(None));
        assert!(acknowledges(Some(&WriteConcern::default())));
        assert!(acknowledges(Some(&nodes(1))));
        assert!(acknowledges(Some(&WriteConcern::builder().w(Acknowledgment::Majority).build())));
        assert!(!acknowledges(Some(&nodes(0))));
    }

    #[test]
    fn blocking_calls_outside_a_runtime_use_the_store_runtime() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let backend = runtime
            .block_on(MongoDbStore::builder(UNREACHABLE, "shop").build())
            .unwrap();
        let store = DocumentStore::new(backend);
        let items = store.collection::<Document>("items");

        assert!(matches!(items.count_blocking(), Err(DocumentStoreError::Backend(_))));
        runtime.block_on(store.shutdown()).unwrap();
    }

    #[test]
    fn build_needs_a_runtime_or_an_explicit_handle() {
        let result = futures::executor::block_on(MongoDbStore::builder(UNREACHABLE, "shop").build());
        assert!(matches!(result, Err(DocumentStoreError::Initialization(_))));

        let runtime = tokio::runtime::Runtime::new().unwrap();
        let backend = futures::executor::block_on(
            MongoDbStore::builder(UNREACHABLE, "shop")
                .runtime(runtime.handle().clone())
                .build(),
        )
        .unwrap();
        runtime.block_on(backend.shutdown()).unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn blocking_calls_inside_a_worker_move_off_the_runtime() {
        let store = DocumentStore::new(MongoDbStore::builder(UNREACHABLE, "shop").build().await.unwrap());
        let items = store.collection::<Document>("items");

        assert!(matches!(items.count_blocking(), Err(DocumentStoreError::Backend(_))));
    }

    #[tokio::test]
    async fn blocking_calls_are_refused_on_a_current_thread_runtime() {
        let store = DocumentStore::new(MongoDbStore::builder(UNREACHABLE, "shop").build().await.unwrap());
        let items = store.collection::<Document>("items");

        let err = items.count_blocking().unwrap_err();
        assert!(err.to_string().contains("cannot block the current thread"));
    }
}
