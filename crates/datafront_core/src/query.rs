//! Parameterized queries layered over tables.

use crate::collection::EntityCollection;
use crate::context::RequestContext;
use crate::error::{FrontError, FrontResult};
use crate::resource::{FrontBinding, FrontResource, TableResource};
use crate::table::QueryableTable;
use datafront_protocol::{
    ClientId, EntityKey, QueryNotification, TableRequest, TableResponse, TableUnsubscribeRequest,
};
use parking_lot::{Mutex, RwLock};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

/// Data source signature for a parameterized query.
type QuerySource<P, T> = dyn Fn(&P, &TableRequest, &RequestContext) -> FrontResult<EntityCollection<T>>
    + Send
    + Sync;

/// Listener registrations keyed by canonical parameter text.
///
/// Invariant: a client appears under a parameter key iff the key appears
/// in that client's set. Empty sets are pruned.
#[derive(Debug, Default)]
struct ListenerIndex {
    by_parameter: HashMap<String, HashSet<ClientId>>,
    by_client: HashMap<ClientId, HashSet<String>>,
}

impl ListenerIndex {
    fn register(&mut self, key: &str, client: &ClientId) {
        self.by_parameter
            .entry(key.to_string())
            .or_default()
            .insert(client.clone());
        self.by_client
            .entry(client.clone())
            .or_default()
            .insert(key.to_string());
    }

    fn remove(&mut self, key: &str, client: &ClientId) {
        if let Some(clients) = self.by_parameter.get_mut(key) {
            clients.remove(client);
            if clients.is_empty() {
                self.by_parameter.remove(key);
            }
        }
        if let Some(keys) = self.by_client.get_mut(client) {
            keys.remove(key);
            if keys.is_empty() {
                self.by_client.remove(client);
            }
        }
    }

    fn remove_client(&mut self, client: &ClientId) {
        let Some(keys) = self.by_client.remove(client) else {
            return;
        };
        for key in keys {
            if let Some(clients) = self.by_parameter.get_mut(&key) {
                clients.remove(client);
                if clients.is_empty() {
                    self.by_parameter.remove(&key);
                }
            }
        }
    }

    fn listeners_of(&self, key: &str) -> Vec<ClientId> {
        self.by_parameter
            .get(key)
            .map(|clients| clients.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn clear(&mut self) {
        self.by_parameter.clear();
        self.by_client.clear();
    }
}

/// A parameterized view over a table, with change tracking per parameter.
///
/// A query decodes each request's payload into its parameter type `P`,
/// runs its data source, and subscribes the client twice: to the returned
/// entities on the underlying [`QueryableTable`] (so entity updates flow
/// through the table's fan-out) and as a listener for the parameter value
/// itself. [`publish_changed`](TrackableTableQuery::publish_changed) later
/// tells exactly the clients listening on that parameter to re-fetch.
///
/// Parameter equality is canonical: requests decode to `P` and re-encode,
/// so field order and unknown fields in the incoming JSON do not split
/// listeners across keys.
pub struct TrackableTableQuery<P, T> {
    table: Arc<QueryableTable<T>>,
    source: Box<QuerySource<P, T>>,
    listeners: Mutex<ListenerIndex>,
    binding: RwLock<Option<FrontBinding>>,
}

impl<P, T> TrackableTableQuery<P, T>
where
    P: Serialize + DeserializeOwned,
{
    /// Creates a query over the given table, backed by the given data
    /// source.
    pub fn new(
        table: Arc<QueryableTable<T>>,
        source: impl Fn(&P, &TableRequest, &RequestContext) -> FrontResult<EntityCollection<T>>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        Self {
            table,
            source: Box::new(source),
            listeners: Mutex::new(ListenerIndex::default()),
            binding: RwLock::new(None),
        }
    }

    /// Decodes the request parameter, runs the data source, and records
    /// the client as a listener.
    ///
    /// Without a payload the request is invalid. A payload that does not
    /// decode to `P` fails before the data source runs. When the request
    /// is just browsing, neither the listener nor the table subscription
    /// is recorded.
    pub fn query(
        &self,
        request: &TableRequest,
        ctx: &RequestContext,
    ) -> FrontResult<TableResponse> {
        let payload = request
            .payload
            .as_ref()
            .ok_or_else(|| FrontError::validation("query request carries no parameter payload"))?;
        let param: P = serde_json::from_value(payload.clone())?;
        let collection = (self.source)(&param, request, ctx)?;
        let values = collection.visible_entries(ctx)?;
        if !request.just_browsing {
            let key = canonical_key(&param)?;
            self.listeners.lock().register(&key, &ctx.client);
            let entity_keys: Vec<EntityKey> = values.keys().cloned().collect();
            self.table.subscribe_for_response(&ctx.client, &entity_keys);
        }
        Ok(TableResponse::new(values))
    }

    /// Notifies every client listening on this parameter that the query's
    /// result set changed and should be re-fetched.
    ///
    /// Clients listening on other parameter values receive nothing.
    pub fn publish_changed(&self, param: &P) -> FrontResult<()> {
        let binding = self.require_binding()?;
        let value = serde_json::to_value(param)?;
        let key = value.to_string();
        let listeners = self.listeners.lock().listeners_of(&key);
        debug!(path = %binding.path(), listeners = listeners.len(), "query changed");
        for client in listeners {
            binding.queue().push_query_notification(
                &client,
                QueryNotification::new(binding.path().clone(), Some(value.clone())),
            );
        }
        Ok(())
    }

    /// Removes one client's listener for one parameter value.
    ///
    /// Entity subscriptions the client picked up on the underlying table
    /// are left in place; remove those through the table.
    pub fn unsubscribe(&self, param: &P, client: &ClientId) -> FrontResult<()> {
        let key = canonical_key(param)?;
        self.listeners.lock().remove(&key, client);
        Ok(())
    }

    /// Removes every listener registration one client holds. Used on
    /// disconnect.
    pub fn unsubscribe_all(&self, client: &ClientId) {
        self.listeners.lock().remove_client(client);
    }

    /// Returns the number of clients listening on this parameter value.
    pub fn listener_count(&self, param: &P) -> FrontResult<usize> {
        let key = canonical_key(param)?;
        Ok(self.listeners.lock().listeners_of(&key).len())
    }

    /// Returns true if the client listens on this parameter value.
    pub fn is_listening(&self, param: &P, client: &ClientId) -> FrontResult<bool> {
        let key = canonical_key(param)?;
        Ok(self.listeners.lock().listeners_of(&key).contains(client))
    }

    fn require_binding(&self) -> FrontResult<FrontBinding> {
        self.binding.read().clone().ok_or(FrontError::NotAttached)
    }
}

/// Canonical lookup key for a parameter value.
///
/// Encoding through `P` sorts object fields and drops anything the
/// parameter type does not carry, so equal parameters always produce
/// equal keys.
fn canonical_key<P: Serialize>(param: &P) -> FrontResult<String> {
    Ok(serde_json::to_value(param)?.to_string())
}

impl<P, T> FrontResource for TrackableTableQuery<P, T>
where
    P: Serialize + DeserializeOwned,
{
    fn attach(&self, binding: FrontBinding) -> FrontResult<()> {
        let mut slot = self.binding.write();
        if slot.is_some() {
            return Err(FrontError::AlreadyAttached);
        }
        *slot = Some(binding);
        Ok(())
    }

    fn detach(&self) {
        *self.binding.write() = None;
    }

    fn dispose(&self) {
        self.listeners.lock().clear();
    }
}

impl<P, T> TableResource for TrackableTableQuery<P, T>
where
    P: Serialize + DeserializeOwned,
{
    fn handle_query(
        &self,
        request: &TableRequest,
        ctx: &RequestContext,
    ) -> FrontResult<TableResponse> {
        self.query(request, ctx)
    }

    fn handle_unsubscribe(
        &self,
        request: &TableUnsubscribeRequest,
        client: &ClientId,
    ) -> FrontResult<()> {
        let payload = request.payload.as_ref().ok_or_else(|| {
            FrontError::validation("unsubscribing from a query requires the parameter payload")
        })?;
        let param: P = serde_json::from_value(payload.clone())?;
        self.unsubscribe(&param, client)
    }

    fn forget_client(&self, client: &ClientId) {
        self.unsubscribe_all(client);
    }
}
