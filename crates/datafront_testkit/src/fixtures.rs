//! Canned entities, stores, and a fully wired front for scenario tests.

use crate::comms::RecordingComms;
use crate::dispatch::LoopbackDispatcher;
use datafront_core::{
    Action, DataFront, EntityCollection, EntityDescriptor, FrontConfig, FrontError, FrontResult,
    QueryableSingleton, QueryableTable, SerdeDescriptor, SessionEvents, TrackableTableQuery,
};
use datafront_protocol::{
    ActionRequest, ClientId, DispatcherCommand, EntityKey, ResourcePath, ResponseBody,
    SingletonRequest, SingletonUnsubscribeRequest, TableRequest, TableUnsubscribeRequest, UserId,
};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// A player base, the canonical test entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Base {
    /// Numeric id; stringified as the entity key.
    pub id: u64,
    /// Display name.
    pub name: String,
    /// Company the base belongs to.
    pub company: String,
    /// Upgrade level.
    pub level: u32,
}

impl Base {
    /// Creates a level-1 base.
    pub fn new(id: u64, name: impl Into<String>, company: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            company: company.into(),
            level: 1,
        }
    }

    /// The entity key clients subscribe under.
    pub fn key(&self) -> EntityKey {
        EntityKey::new(self.id.to_string())
    }
}

/// Query parameter selecting bases by company.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanyFilter {
    /// Company to select.
    pub company: String,
}

impl CompanyFilter {
    /// Creates a filter for the given company.
    pub fn new(company: impl Into<String>) -> Self {
        Self {
            company: company.into(),
        }
    }
}

/// Value served by the clock singleton fixture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldClock {
    /// Monotonic world tick.
    pub tick: u64,
}

/// Parameter for the rename action fixture.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenameBase {
    /// Base to rename.
    pub id: u64,
    /// New name.
    pub to: String,
}

/// Shared mutable store of bases the fixture data sources read.
#[derive(Debug, Default, Clone)]
pub struct BaseStore {
    inner: Arc<RwLock<BTreeMap<u64, Base>>>,
}

impl BaseStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store holding the given bases.
    pub fn seeded(bases: impl IntoIterator<Item = Base>) -> Self {
        let store = Self::new();
        for base in bases {
            store.insert(base);
        }
        store
    }

    /// Inserts or replaces a base.
    pub fn insert(&self, base: Base) {
        self.inner.write().insert(base.id, base);
    }

    /// Removes a base.
    pub fn remove(&self, id: u64) -> Option<Base> {
        self.inner.write().remove(&id)
    }

    /// Looks up a base by id.
    pub fn get(&self, id: u64) -> Option<Base> {
        self.inner.read().get(&id).cloned()
    }

    /// Renames a base in place, returning the updated copy.
    pub fn rename(&self, id: u64, to: &str) -> Option<Base> {
        let mut inner = self.inner.write();
        let base = inner.get_mut(&id)?;
        base.name = to.to_string();
        Some(base.clone())
    }

    /// Bases matching the given keys; an empty slice selects everything.
    pub fn select(&self, ids: &[EntityKey]) -> Vec<Base> {
        let inner = self.inner.read();
        if ids.is_empty() {
            return inner.values().cloned().collect();
        }
        inner
            .values()
            .filter(|base| ids.iter().any(|id| id.as_str() == base.id.to_string()))
            .cloned()
            .collect()
    }

    /// Bases belonging to the given company.
    pub fn by_company(&self, company: &str) -> Vec<Base> {
        self.inner
            .read()
            .values()
            .filter(|base| base.company == company)
            .cloned()
            .collect()
    }

    /// Every base in the store.
    pub fn all(&self) -> Vec<Base> {
        self.inner.read().values().cloned().collect()
    }
}

/// Descriptor keying bases by stringified id.
pub fn base_descriptor() -> Arc<dyn EntityDescriptor<Base>> {
    Arc::new(SerdeDescriptor::new(Base::key))
}

/// Collection over the given bases with the standard descriptor.
pub fn base_collection(bases: Vec<Base>) -> EntityCollection<Base> {
    EntityCollection::new(base_descriptor(), bases)
}

/// Three bases spread over two companies: 12 and 77 at acme, 40 at globex.
pub fn sample_bases() -> Vec<Base> {
    vec![
        Base::new(12, "North Keep", "acme"),
        Base::new(40, "South Fort", "globex"),
        Base::new(77, "East Outpost", "acme"),
    ]
}

/// A registry wired end to end over the base fixtures.
///
/// Attached resources: the `bases` table, the `bases/byCompany` query, the
/// `clock` singleton, and the `bases/rename` action (which updates the
/// store and publishes the renamed base). Inbound commands go through a
/// loopback dispatcher; outbound broadcasts land in a recorder.
///
/// Must be created inside a Tokio runtime; `start` spawns the delivery,
/// sweep, and session-listener workers.
pub struct TestFront {
    /// The registry under test.
    pub front: Arc<DataFront>,
    /// Records outbound broadcasts.
    pub comms: Arc<RecordingComms>,
    /// Routes inbound commands.
    pub dispatcher: LoopbackDispatcher,
    /// Session lifecycle bus the front watches.
    pub events: SessionEvents,
    /// Backing store the table and query sources read.
    pub store: BaseStore,
    /// The bases table.
    pub bases: Arc<QueryableTable<Base>>,
    /// The by-company query.
    pub by_company: Arc<TrackableTableQuery<CompanyFilter, Base>>,
    /// The clock singleton.
    pub clock: Arc<QueryableSingleton<WorldClock>>,
    /// Backing tick for the clock singleton.
    pub tick: Arc<AtomicU64>,
    /// The rename action.
    pub rename: Arc<Action<RenameBase, Base>>,
}

impl TestFront {
    /// Debounce window the fixture front runs with.
    pub const DEBOUNCE: Duration = Duration::from_millis(10);
    /// Sweep interval the fixture front runs with.
    pub const SWEEP: Duration = Duration::from_millis(25);

    /// Builds and starts a front over [`sample_bases`].
    pub fn start() -> Self {
        Self::with_store(BaseStore::seeded(sample_bases()))
    }

    /// Builds and starts a front over the given store.
    pub fn with_store(store: BaseStore) -> Self {
        crate::logging::init_tracing();
        let comms = RecordingComms::new();
        let config = FrontConfig::new("data")
            .with_debounce(Self::DEBOUNCE)
            .with_sweep_interval(Self::SWEEP);
        let front = DataFront::new(config, comms.clone());

        let bases = Arc::new(QueryableTable::new({
            let store = store.clone();
            move |request: &TableRequest, _ctx| Ok(base_collection(store.select(&request.ids)))
        }));
        front
            .attach_table(ResourcePath::from("bases"), bases.clone())
            .expect("Failed to attach bases table");

        let by_company = Arc::new(TrackableTableQuery::new(bases.clone(), {
            let store = store.clone();
            move |param: &CompanyFilter, _request, _ctx| {
                Ok(base_collection(store.by_company(&param.company)))
            }
        }));
        front
            .attach_query(ResourcePath::new(["bases", "byCompany"]), by_company.clone())
            .expect("Failed to attach company query");

        let tick = Arc::new(AtomicU64::new(0));
        let clock = Arc::new(QueryableSingleton::new({
            let tick = Arc::clone(&tick);
            move |_ctx| {
                Ok(WorldClock {
                    tick: tick.load(Ordering::SeqCst),
                })
            }
        }));
        front
            .attach_singleton(ResourcePath::from("clock"), clock.clone())
            .expect("Failed to attach clock singleton");

        let rename = Arc::new(Action::new({
            let store = store.clone();
            let bases = bases.clone();
            move |param: RenameBase, _user: &UserId| {
                let updated = store
                    .rename(param.id, &param.to)
                    .ok_or_else(|| FrontError::validation(format!("no base {}", param.id)))?;
                bases.publish_entities(&base_collection(vec![updated.clone()]))?;
                Ok(updated)
            }
        }));
        front
            .attach_action(ResourcePath::new(["bases", "rename"]), rename.clone())
            .expect("Failed to attach rename action");

        let dispatcher = LoopbackDispatcher::new();
        front.register(&dispatcher);
        let events = SessionEvents::default();
        front.watch_sessions(&events);
        front.run();

        Self {
            front,
            comms,
            dispatcher,
            events,
            store,
            bases,
            by_company,
            clock,
            tick,
            rename,
        }
    }

    /// Routes a command through the loopback dispatcher.
    pub fn dispatch(&self, command: &DispatcherCommand) -> FrontResult<ResponseBody> {
        self.dispatcher.dispatch(command)
    }

    /// Advances the world clock and publishes the new value to
    /// subscribers.
    pub fn advance_clock(&self) -> FrontResult<()> {
        let tick = self.tick.fetch_add(1, Ordering::SeqCst) + 1;
        self.clock.publish_update(&WorldClock { tick })
    }

    /// Sleeps long enough for any armed debounce window to flush.
    pub async fn settle(&self) {
        tokio::time::sleep(Self::DEBOUNCE * 3).await;
    }

    /// Stops the workers and disposes every attached resource.
    pub async fn shutdown(self) {
        self.front.dispose().await;
    }
}

/// A fresh idempotency token.
pub fn fresh_token() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn command(kind: &str, client: &str, payload: Value) -> DispatcherCommand {
    DispatcherCommand::new(
        uuid::Uuid::new_v4().to_string(),
        ClientId::new(client),
        UserId::new(format!("u-{client}")),
        "data",
        kind,
        payload,
    )
}

fn encode<T: Serialize>(body: &T) -> Value {
    serde_json::to_value(body).expect("Failed to encode request body")
}

/// Builds a `table` command selecting the given entity keys.
pub fn table_command(client: &str, path: ResourcePath, ids: &[&str]) -> DispatcherCommand {
    let body =
        TableRequest::new(path).with_ids(ids.iter().map(|id| EntityKey::new(*id)).collect());
    command("table", client, encode(&body))
}

/// Builds a `table` command that reads without subscribing.
pub fn browse_command(client: &str, path: ResourcePath, ids: &[&str]) -> DispatcherCommand {
    let body = TableRequest::new(path)
        .with_ids(ids.iter().map(|id| EntityKey::new(*id)).collect())
        .browsing();
    command("table", client, encode(&body))
}

/// Builds a `table` command against a parameterized query.
pub fn query_command(client: &str, path: ResourcePath, parameter: Value) -> DispatcherCommand {
    let body = TableRequest::new(path).with_payload(parameter);
    command("table", client, encode(&body))
}

/// Builds a `-table` command dropping the given entity subscriptions.
pub fn unsubscribe_ids_command(
    client: &str,
    path: ResourcePath,
    ids: &[&str],
) -> DispatcherCommand {
    let body =
        TableUnsubscribeRequest::for_ids(path, ids.iter().map(|id| EntityKey::new(*id)).collect());
    command("-table", client, encode(&body))
}

/// Builds a `-table` command dropping a query listener.
pub fn unsubscribe_query_command(
    client: &str,
    path: ResourcePath,
    parameter: Value,
) -> DispatcherCommand {
    let body = TableUnsubscribeRequest::for_payload(path, parameter);
    command("-table", client, encode(&body))
}

/// Builds a `singleton` command.
pub fn singleton_command(client: &str, path: ResourcePath) -> DispatcherCommand {
    command("singleton", client, encode(&SingletonRequest::new(path)))
}

/// Builds a `singleton` command that reads without subscribing.
pub fn singleton_browse_command(client: &str, path: ResourcePath) -> DispatcherCommand {
    command(
        "singleton",
        client,
        encode(&SingletonRequest::new(path).browsing()),
    )
}

/// Builds a `-singleton` command.
pub fn singleton_unsubscribe_command(client: &str, path: ResourcePath) -> DispatcherCommand {
    command(
        "-singleton",
        client,
        encode(&SingletonUnsubscribeRequest::new(path)),
    )
}

/// Builds an `action` command.
pub fn action_command(
    client: &str,
    name: &str,
    token: &str,
    payload: Option<Value>,
) -> DispatcherCommand {
    let body = ActionRequest::new(name, token, payload);
    command("action", client, encode(&body))
}
