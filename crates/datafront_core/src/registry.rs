//! The data-source registry and dispatcher-facing command handler.

use crate::comms::{Comms, SessionEvent, SessionEvents};
use crate::config::FrontConfig;
use crate::context::RequestContext;
use crate::delivery::DeliveryQueue;
use crate::dispatch::{CommandHandler, Dispatcher};
use crate::error::{FrontError, FrontResult};
use crate::resource::{ActionResource, FrontBinding, SingletonResource, TableResource};
use crate::sweep::PeriodicSweep;
use datafront_protocol::{
    ActionRequest, ClientId, DispatcherCommand, RequestKind, ResourcePath, ResponseBody,
    SingletonRequest, SingletonUnsubscribeRequest, TableRequest, TableUnsubscribeRequest,
};
use parking_lot::{Mutex, RwLock};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Registry of live data sources and the entry point for the sync core.
///
/// Hosts attach tables, table queries, singletons, and actions under
/// unique paths, register the front on their command dispatcher, and call
/// [`run`](DataFront::run) to start the delivery and sweep workers.
/// Inbound commands are routed to the resource attached under the
/// requested path; producer pushes on the attached resources flow out
/// through the shared [`DeliveryQueue`].
///
/// `table` and `-table` commands probe plain tables first, then table
/// queries, so the two kinds share one path namespace from the client's
/// point of view. Paths are unique across all four kinds.
pub struct DataFront {
    config: FrontConfig,
    tables: RwLock<HashMap<ResourcePath, Arc<dyn TableResource>>>,
    queries: RwLock<HashMap<ResourcePath, Arc<dyn TableResource>>>,
    singletons: RwLock<HashMap<ResourcePath, Arc<dyn SingletonResource>>>,
    actions: RwLock<HashMap<ResourcePath, Arc<dyn ActionResource>>>,
    queue: Arc<DeliveryQueue>,
    sweep: Mutex<Option<PeriodicSweep>>,
    listener: Mutex<Option<JoinHandle<()>>>,
    registration: Mutex<()>,
    // Weak self-handle the background workers capture.
    this: Weak<DataFront>,
}

impl DataFront {
    /// Creates a registry broadcasting through `comms`.
    pub fn new(config: FrontConfig, comms: Arc<dyn Comms>) -> Arc<Self> {
        let queue = Arc::new(DeliveryQueue::new(
            comms,
            config.scope.clone(),
            config.debounce,
        ));
        Arc::new_cyclic(|this| Self {
            config,
            tables: RwLock::new(HashMap::new()),
            queries: RwLock::new(HashMap::new()),
            singletons: RwLock::new(HashMap::new()),
            actions: RwLock::new(HashMap::new()),
            queue,
            sweep: Mutex::new(None),
            listener: Mutex::new(None),
            registration: Mutex::new(()),
            this: this.clone(),
        })
    }

    /// Attaches a table under the given path.
    pub fn attach_table(
        &self,
        path: ResourcePath,
        table: Arc<dyn TableResource>,
    ) -> FrontResult<()> {
        let _guard = self.registration.lock();
        self.ensure_vacant(&path)?;
        table.attach(FrontBinding::new(path.clone(), Arc::clone(&self.queue)))?;
        debug!(%path, "table attached");
        self.tables.write().insert(path, table);
        Ok(())
    }

    /// Attaches a table query under the given path.
    pub fn attach_query(
        &self,
        path: ResourcePath,
        query: Arc<dyn TableResource>,
    ) -> FrontResult<()> {
        let _guard = self.registration.lock();
        self.ensure_vacant(&path)?;
        query.attach(FrontBinding::new(path.clone(), Arc::clone(&self.queue)))?;
        debug!(%path, "query attached");
        self.queries.write().insert(path, query);
        Ok(())
    }

    /// Attaches a singleton under the given path.
    pub fn attach_singleton(
        &self,
        path: ResourcePath,
        singleton: Arc<dyn SingletonResource>,
    ) -> FrontResult<()> {
        let _guard = self.registration.lock();
        self.ensure_vacant(&path)?;
        singleton.attach(FrontBinding::new(path.clone(), Arc::clone(&self.queue)))?;
        debug!(%path, "singleton attached");
        self.singletons.write().insert(path, singleton);
        Ok(())
    }

    /// Attaches an action under the given path.
    ///
    /// Clients invoke it with the stringified path as the action name.
    pub fn attach_action(
        &self,
        path: ResourcePath,
        action: Arc<dyn ActionResource>,
    ) -> FrontResult<()> {
        let _guard = self.registration.lock();
        self.ensure_vacant(&path)?;
        action.attach(FrontBinding::new(path.clone(), Arc::clone(&self.queue)))?;
        debug!(%path, "action attached");
        self.actions.write().insert(path, action);
        Ok(())
    }

    /// Detaches and disposes the table attached under the path.
    pub fn remove_table(&self, path: &ResourcePath) -> FrontResult<()> {
        let _guard = self.registration.lock();
        let table = self
            .tables
            .write()
            .remove(path)
            .ok_or_else(|| FrontError::PathNotFound { path: path.clone() })?;
        table.detach();
        table.dispose();
        debug!(%path, "table removed");
        Ok(())
    }

    /// Detaches and disposes the query attached under the path.
    pub fn remove_query(&self, path: &ResourcePath) -> FrontResult<()> {
        let _guard = self.registration.lock();
        let query = self
            .queries
            .write()
            .remove(path)
            .ok_or_else(|| FrontError::PathNotFound { path: path.clone() })?;
        query.detach();
        query.dispose();
        debug!(%path, "query removed");
        Ok(())
    }

    /// Detaches and disposes the singleton attached under the path.
    pub fn remove_singleton(&self, path: &ResourcePath) -> FrontResult<()> {
        let _guard = self.registration.lock();
        let singleton = self
            .singletons
            .write()
            .remove(path)
            .ok_or_else(|| FrontError::PathNotFound { path: path.clone() })?;
        singleton.detach();
        singleton.dispose();
        debug!(%path, "singleton removed");
        Ok(())
    }

    /// Detaches and disposes the action attached under the path.
    pub fn remove_action(&self, path: &ResourcePath) -> FrontResult<()> {
        let _guard = self.registration.lock();
        let action = self
            .actions
            .write()
            .remove(path)
            .ok_or_else(|| FrontError::PathNotFound { path: path.clone() })?;
        action.detach();
        action.dispose();
        debug!(%path, "action removed");
        Ok(())
    }

    /// Registers the front as the command handler for its scope.
    pub fn register(&self, dispatcher: &dyn Dispatcher) {
        if let Some(front) = self.this.upgrade() {
            dispatcher.register_handler(&self.config.scope, front);
        }
    }

    /// Starts the delivery worker and the periodic action-token sweep.
    ///
    /// Calling `run` again has no effect.
    pub fn run(&self) {
        self.queue.start();
        let mut sweep = self.sweep.lock();
        if sweep.is_some() {
            return;
        }
        let registry = self.this.clone();
        let worker = PeriodicSweep::new(self.config.sweep_interval, move || {
            if let Some(registry) = registry.upgrade() {
                registry.sweep_actions();
            }
        });
        worker.start();
        *sweep = Some(worker);
    }

    /// Subscribes to session lifecycle events and cleans up each client
    /// that goes offline.
    ///
    /// Calling `watch_sessions` again has no effect while the listener is
    /// running.
    pub fn watch_sessions(&self, events: &SessionEvents) {
        let mut listener = self.listener.lock();
        if listener.is_some() {
            return;
        }
        let mut receiver = events.subscribe();
        let registry = self.this.clone();
        *listener = Some(tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(SessionEvent::ClientOffline { client }) => {
                        let Some(registry) = registry.upgrade() else {
                            break;
                        };
                        registry.client_offline(&client);
                    }
                    Err(RecvError::Lagged(missed)) => {
                        warn!(missed, "session event listener lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            debug!("session listener exited");
        }));
    }

    /// Drops every subscription and listener registration the client
    /// holds, across all tables, queries, and singletons.
    ///
    /// Updates already queued for the client are left to flush; delivery
    /// to a gone session fails harmlessly at the transport.
    pub fn client_offline(&self, client: &ClientId) {
        debug!(%client, "cleaning up offline client");
        let table_likes: Vec<Arc<dyn TableResource>> = {
            let tables = self.tables.read();
            let queries = self.queries.read();
            tables.values().chain(queries.values()).cloned().collect()
        };
        for resource in table_likes {
            resource.forget_client(client);
        }
        let singletons: Vec<Arc<dyn SingletonResource>> =
            self.singletons.read().values().cloned().collect();
        for singleton in singletons {
            singleton.forget_client(client);
        }
    }

    /// Stops the workers, discards queued updates, and disposes every
    /// attached resource.
    pub async fn dispose(&self) {
        let sweep = self.sweep.lock().take();
        if let Some(sweep) = sweep {
            sweep.stop().await;
        }
        let listener = self.listener.lock().take();
        if let Some(listener) = listener {
            listener.abort();
        }
        self.queue.stop().await;

        let tables: Vec<Arc<dyn TableResource>> =
            self.tables.write().drain().map(|(_, r)| r).collect();
        let queries: Vec<Arc<dyn TableResource>> =
            self.queries.write().drain().map(|(_, r)| r).collect();
        for resource in tables.into_iter().chain(queries) {
            resource.detach();
            resource.dispose();
        }
        let singletons: Vec<Arc<dyn SingletonResource>> =
            self.singletons.write().drain().map(|(_, r)| r).collect();
        for singleton in singletons {
            singleton.detach();
            singleton.dispose();
        }
        let actions: Vec<Arc<dyn ActionResource>> =
            self.actions.write().drain().map(|(_, r)| r).collect();
        for action in actions {
            action.detach();
            action.dispose();
        }
        debug!("registry disposed");
    }

    /// The registry's configuration.
    pub fn config(&self) -> &FrontConfig {
        &self.config
    }

    /// The shared delivery queue.
    pub fn queue(&self) -> &Arc<DeliveryQueue> {
        &self.queue
    }

    /// Number of attached tables.
    pub fn table_count(&self) -> usize {
        self.tables.read().len()
    }

    /// Number of attached table queries.
    pub fn query_count(&self) -> usize {
        self.queries.read().len()
    }

    /// Number of attached singletons.
    pub fn singleton_count(&self) -> usize {
        self.singletons.read().len()
    }

    /// Number of attached actions.
    pub fn action_count(&self) -> usize {
        self.actions.read().len()
    }

    fn ensure_vacant(&self, path: &ResourcePath) -> FrontResult<()> {
        let occupied = self.tables.read().contains_key(path)
            || self.queries.read().contains_key(path)
            || self.singletons.read().contains_key(path)
            || self.actions.read().contains_key(path);
        if occupied {
            return Err(FrontError::PathOccupied { path: path.clone() });
        }
        Ok(())
    }

    fn lookup_table_like(&self, path: &ResourcePath) -> FrontResult<Arc<dyn TableResource>> {
        if let Some(table) = self.tables.read().get(path) {
            return Ok(Arc::clone(table));
        }
        if let Some(query) = self.queries.read().get(path) {
            return Ok(Arc::clone(query));
        }
        Err(FrontError::PathNotFound { path: path.clone() })
    }

    fn lookup_singleton(&self, path: &ResourcePath) -> FrontResult<Arc<dyn SingletonResource>> {
        self.singletons
            .read()
            .get(path)
            .cloned()
            .ok_or_else(|| FrontError::PathNotFound { path: path.clone() })
    }

    fn lookup_action(&self, path: &ResourcePath) -> FrontResult<Arc<dyn ActionResource>> {
        self.actions
            .read()
            .get(path)
            .cloned()
            .ok_or_else(|| FrontError::PathNotFound { path: path.clone() })
    }

    fn sweep_actions(&self) {
        let actions: Vec<Arc<dyn ActionResource>> =
            self.actions.read().values().cloned().collect();
        for action in actions {
            action.clean_up();
        }
    }
}

/// Decodes a command payload into its request envelope.
///
/// Envelope failures blame the request shape; payload decoding inside a
/// resource reports [`FrontError::Decode`] instead.
fn decode_envelope<T: DeserializeOwned>(payload: &Value) -> FrontResult<T> {
    serde_json::from_value(payload.clone())
        .map_err(|error| FrontError::validation(format!("malformed request envelope: {error}")))
}

impl CommandHandler for DataFront {
    fn handle(&self, command: &DispatcherCommand) -> FrontResult<ResponseBody> {
        let Some(kind) = command.kind() else {
            return Err(FrontError::UnsupportedCommand {
                command: command.command.clone(),
            });
        };
        debug!(client = %command.client, %kind, "handling command");
        let ctx = RequestContext::from(command);
        match kind {
            RequestKind::Table => {
                let request: TableRequest = decode_envelope(&command.payload)?;
                let resource = self.lookup_table_like(&request.path)?;
                let response = resource.handle_query(&request, &ctx)?;
                Ok(ResponseBody::Table(response))
            }
            RequestKind::TableUnsubscribe => {
                let request: TableUnsubscribeRequest = decode_envelope(&command.payload)?;
                let resource = self.lookup_table_like(&request.path)?;
                resource.handle_unsubscribe(&request, &ctx.client)?;
                Ok(ResponseBody::Ack)
            }
            RequestKind::Singleton => {
                let request: SingletonRequest = decode_envelope(&command.payload)?;
                let singleton = self.lookup_singleton(&request.path)?;
                let response = singleton.handle_query(&request, &ctx)?;
                Ok(ResponseBody::Singleton(response))
            }
            RequestKind::SingletonUnsubscribe => {
                let request: SingletonUnsubscribeRequest = decode_envelope(&command.payload)?;
                let singleton = self.lookup_singleton(&request.path)?;
                singleton.forget_client(&ctx.client);
                Ok(ResponseBody::Ack)
            }
            RequestKind::Action => {
                let request: ActionRequest = decode_envelope(&command.payload)?;
                let path = ResourcePath::parse(&request.name)
                    .map_err(|error| FrontError::validation(error.to_string()))?;
                let action = self.lookup_action(&path)?;
                let result = action.handle_run(&request, &ctx.user)?;
                Ok(ResponseBody::Action(result))
            }
            RequestKind::Log | RequestKind::LogUnsubscribe => Err(FrontError::UnsupportedCommand {
                command: command.command.clone(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::Action;
    use crate::collection::{EntityCollection, EntityDescriptor, SerdeDescriptor};
    use crate::query::TrackableTableQuery;
    use crate::singleton::QueryableSingleton;
    use crate::table::QueryableTable;
    use datafront_protocol::{EntityKey, UserId};
    use serde::{Deserialize, Serialize};
    use serde_json::json;
    use std::time::Duration;

    #[derive(Debug, Clone, Serialize)]
    struct Base {
        id: u64,
        name: String,
        company: String,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct CompanyFilter {
        company: String,
    }

    struct NullComms;

    impl Comms for NullComms {
        fn broadcast(
            &self,
            _scope: &str,
            _event: &str,
            _recipients: &[ClientId],
            _payload: Value,
        ) -> Result<(), String> {
            Ok(())
        }
    }

    fn bases() -> Vec<Base> {
        vec![
            Base {
                id: 12,
                name: "North Keep".into(),
                company: "acme".into(),
            },
            Base {
                id: 40,
                name: "South Fort".into(),
                company: "globex".into(),
            },
        ]
    }

    fn descriptor() -> Arc<dyn EntityDescriptor<Base>> {
        Arc::new(SerdeDescriptor::new(|base: &Base| {
            EntityKey::new(base.id.to_string())
        }))
    }

    fn bases_table() -> Arc<QueryableTable<Base>> {
        let descriptor = descriptor();
        let entities = bases();
        Arc::new(QueryableTable::new(move |request, _ctx| {
            let selected: Vec<Base> = if request.ids.is_empty() {
                entities.clone()
            } else {
                entities
                    .iter()
                    .filter(|base| {
                        request
                            .ids
                            .iter()
                            .any(|id| id.as_str() == base.id.to_string())
                    })
                    .cloned()
                    .collect()
            };
            Ok(EntityCollection::new(Arc::clone(&descriptor), selected))
        }))
    }

    fn company_query(
        table: &Arc<QueryableTable<Base>>,
    ) -> Arc<TrackableTableQuery<CompanyFilter, Base>> {
        let descriptor = descriptor();
        let entities = bases();
        Arc::new(TrackableTableQuery::new(
            Arc::clone(table),
            move |param: &CompanyFilter, _request, _ctx| {
                let selected: Vec<Base> = entities
                    .iter()
                    .filter(|base| base.company == param.company)
                    .cloned()
                    .collect();
                Ok(EntityCollection::new(Arc::clone(&descriptor), selected))
            },
        ))
    }

    fn front() -> Arc<DataFront> {
        DataFront::new(
            FrontConfig::new("data")
                .with_debounce(Duration::from_millis(5))
                .with_sweep_interval(Duration::from_millis(10)),
            Arc::new(NullComms),
        )
    }

    fn command(kind: &str, payload: Value) -> DispatcherCommand {
        DispatcherCommand::new(
            "r-1",
            ClientId::new("c-1"),
            UserId::new("ada"),
            "data",
            kind,
            payload,
        )
    }

    #[test]
    fn table_command_round_trips_and_subscribes() {
        let front = front();
        let table = bases_table();
        front
            .attach_table(ResourcePath::from("bases"), table.clone())
            .unwrap();

        let response = front
            .handle(&command("table", json!({"path": ["bases"], "ids": ["12"]})))
            .unwrap();

        let ResponseBody::Table(body) = response else {
            panic!("expected table response");
        };
        assert_eq!(body.len(), 1);
        assert!(body.values.contains_key(&EntityKey::new("12")));
        assert!(table.is_subscribed(&ClientId::new("c-1"), &EntityKey::new("12")));
    }

    #[test]
    fn occupied_path_rejects_any_kind() {
        let front = front();
        front
            .attach_table(ResourcePath::from("bases"), bases_table())
            .unwrap();

        let again = front.attach_table(ResourcePath::from("bases"), bases_table());
        assert!(matches!(again, Err(FrontError::PathOccupied { .. })));

        let singleton: Arc<QueryableSingleton<u64>> =
            Arc::new(QueryableSingleton::new(|_ctx| Ok(7)));
        let cross = front.attach_singleton(ResourcePath::from("bases"), singleton);
        assert!(matches!(cross, Err(FrontError::PathOccupied { .. })));
    }

    #[test]
    fn unknown_path_fails() {
        let front = front();

        let result = front.handle(&command("table", json!({"path": ["ghost"]})));

        assert!(matches!(result, Err(FrontError::PathNotFound { .. })));
    }

    #[test]
    fn reserved_log_commands_fail_explicitly() {
        let front = front();

        for kind in ["log", "-log", "stream"] {
            let result = front.handle(&command(kind, json!({"path": ["battle"]})));
            assert!(
                matches!(result, Err(FrontError::UnsupportedCommand { .. })),
                "{kind} should be unsupported"
            );
        }
    }

    #[test]
    fn malformed_envelope_is_a_validation_error() {
        let front = front();
        front
            .attach_table(ResourcePath::from("bases"), bases_table())
            .unwrap();

        let result = front.handle(&command("table", json!({"ids": 7})));

        assert!(matches!(result, Err(FrontError::Validation { .. })));
    }

    #[test]
    fn table_probe_falls_back_to_queries() {
        let front = front();
        let table = bases_table();
        front
            .attach_table(ResourcePath::from("bases"), table.clone())
            .unwrap();
        let query = company_query(&table);
        front
            .attach_query(ResourcePath::new(["bases", "byCompany"]), query.clone())
            .unwrap();

        let response = front
            .handle(&command(
                "table",
                json!({"path": ["bases", "byCompany"], "payload": {"company": "acme"}}),
            ))
            .unwrap();
        let ResponseBody::Table(body) = response else {
            panic!("expected table response");
        };
        assert_eq!(body.len(), 1);

        let ack = front
            .handle(&command(
                "-table",
                json!({"path": ["bases", "byCompany"], "payload": {"company": "acme"}}),
            ))
            .unwrap();
        assert_eq!(ack, ResponseBody::Ack);
        assert_eq!(
            query
                .listener_count(&CompanyFilter {
                    company: "acme".into()
                })
                .unwrap(),
            0
        );
    }

    #[test]
    fn singleton_round_trip_and_unsubscribe() {
        let front = front();
        let singleton: Arc<QueryableSingleton<u64>> =
            Arc::new(QueryableSingleton::new(|_ctx| Ok(7)));
        front
            .attach_singleton(ResourcePath::from("clock"), singleton.clone())
            .unwrap();

        let response = front
            .handle(&command("singleton", json!({"path": ["clock"]})))
            .unwrap();
        let ResponseBody::Singleton(body) = response else {
            panic!("expected singleton response");
        };
        assert_eq!(body.value, json!(7));
        assert!(singleton.is_subscribed(&ClientId::new("c-1")));

        let ack = front
            .handle(&command("-singleton", json!({"path": ["clock"]})))
            .unwrap();
        assert_eq!(ack, ResponseBody::Ack);
        assert!(!singleton.is_subscribed(&ClientId::new("c-1")));
    }

    #[test]
    fn action_command_parses_the_name_as_a_path() {
        let front = front();
        let action: Arc<Action<Value, Value>> =
            Arc::new(Action::new(|param: Value, _user: &UserId| Ok(param)));
        front
            .attach_action(ResourcePath::new(["bases", "rename"]), action)
            .unwrap();

        let response = front
            .handle(&command(
                "action",
                json!({"name": "bases/rename", "idempotencyToken": "t-1", "payload": {"to": "Keep"}}),
            ))
            .unwrap();
        assert_eq!(response, ResponseBody::Action(json!({"to": "Keep"})));

        let retry = front.handle(&command(
            "action",
            json!({"name": "bases/rename", "idempotencyToken": "t-1", "payload": {"to": "Keep"}}),
        ));
        assert!(matches!(retry, Err(FrontError::DuplicateToken { .. })));
    }

    #[test]
    fn action_with_unparsable_name_fails_validation() {
        let front = front();

        let result = front.handle(&command(
            "action",
            json!({"name": "", "idempotencyToken": "t-1"}),
        ));

        assert!(matches!(result, Err(FrontError::Validation { .. })));
    }

    #[test]
    fn removed_table_is_gone_and_detached() {
        let front = front();
        let table = bases_table();
        front
            .attach_table(ResourcePath::from("bases"), table.clone())
            .unwrap();
        front.remove_table(&ResourcePath::from("bases")).unwrap();

        let result = front.handle(&command("table", json!({"path": ["bases"]})));
        assert!(matches!(result, Err(FrontError::PathNotFound { .. })));

        let publish = table.publish_entities(&EntityCollection::new(descriptor(), bases()));
        assert!(matches!(publish, Err(FrontError::NotAttached)));
        assert_eq!(front.table_count(), 0);
    }

    #[test]
    fn client_offline_forgets_everything() {
        let front = front();
        let table = bases_table();
        front
            .attach_table(ResourcePath::from("bases"), table.clone())
            .unwrap();
        let query = company_query(&table);
        front
            .attach_query(ResourcePath::new(["bases", "byCompany"]), query.clone())
            .unwrap();
        let singleton: Arc<QueryableSingleton<u64>> =
            Arc::new(QueryableSingleton::new(|_ctx| Ok(7)));
        front
            .attach_singleton(ResourcePath::from("clock"), singleton.clone())
            .unwrap();

        front
            .handle(&command("table", json!({"path": ["bases"]})))
            .unwrap();
        front
            .handle(&command(
                "table",
                json!({"path": ["bases", "byCompany"], "payload": {"company": "acme"}}),
            ))
            .unwrap();
        front
            .handle(&command("singleton", json!({"path": ["clock"]})))
            .unwrap();

        let client = ClientId::new("c-1");
        front.client_offline(&client);

        assert!(table.subscriptions_of(&client).is_empty());
        assert_eq!(
            query
                .listener_count(&CompanyFilter {
                    company: "acme".into()
                })
                .unwrap(),
            0
        );
        assert!(!singleton.is_subscribed(&client));
    }

    #[tokio::test]
    async fn run_starts_the_sweep() {
        let front = front();
        let action: Arc<Action<Value, Value>> = Arc::new(
            Action::new(|param: Value, _user: &UserId| Ok(param))
                .with_token_lifetime(Duration::from_millis(5)),
        );
        front
            .attach_action(ResourcePath::from("ping"), action.clone())
            .unwrap();

        front
            .handle(&command(
                "action",
                json!({"name": "ping", "idempotencyToken": "t-1"}),
            ))
            .unwrap();
        assert_eq!(action.token_count(), 1);

        front.run();

        tokio::time::timeout(Duration::from_secs(2), async {
            while action.token_count() > 0 {
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        })
        .await
        .unwrap();

        front.dispose().await;
    }

    #[tokio::test]
    async fn session_events_clean_up_clients() {
        let front = front();
        let table = bases_table();
        front
            .attach_table(ResourcePath::from("bases"), table.clone())
            .unwrap();
        front
            .handle(&command("table", json!({"path": ["bases"]})))
            .unwrap();

        let events = SessionEvents::default();
        front.watch_sessions(&events);
        let client = ClientId::new("c-1");
        assert!(!table.subscriptions_of(&client).is_empty());

        events.emit(SessionEvent::ClientOffline {
            client: client.clone(),
        });

        tokio::time::timeout(Duration::from_secs(2), async {
            while !table.subscriptions_of(&client).is_empty() {
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        })
        .await
        .unwrap();

        front.dispose().await;
    }

    #[tokio::test]
    async fn dispose_stops_workers_and_clears_resources() {
        let front = front();
        front
            .attach_table(ResourcePath::from("bases"), bases_table())
            .unwrap();
        let singleton: Arc<QueryableSingleton<u64>> =
            Arc::new(QueryableSingleton::new(|_ctx| Ok(7)));
        front
            .attach_singleton(ResourcePath::from("clock"), singleton)
            .unwrap();
        front.run();

        front.dispose().await;

        assert_eq!(front.table_count(), 0);
        assert_eq!(front.singleton_count(), 0);
        assert_eq!(
            front.queue().phase(),
            crate::delivery::QueuePhase::Stopped
        );
    }
}
