//! Entity-keyed tables with per-entity, per-client subscription tracking.

use crate::collection::EntityCollection;
use crate::context::RequestContext;
use crate::error::{FrontError, FrontResult};
use crate::resource::{FrontBinding, FrontResource, TableResource};
use datafront_protocol::{
    ClientId, EntityKey, TablePatch, TableRequest, TableResponse, TableUnsubscribeRequest,
};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Data source signature for a table.
type TableSource<T> =
    dyn Fn(&TableRequest, &RequestContext) -> FrontResult<EntityCollection<T>> + Send + Sync;

/// Two mutually-consistent subscription indexes for one table.
///
/// Invariant: a client appears in an entity's set iff the entity appears in
/// that client's set. Empty sets are pruned.
#[derive(Debug, Default)]
struct SubscriptionIndex {
    by_entity: HashMap<EntityKey, HashSet<ClientId>>,
    by_client: HashMap<ClientId, HashSet<EntityKey>>,
}

impl SubscriptionIndex {
    fn subscribe(&mut self, client: &ClientId, keys: &[EntityKey]) {
        if keys.is_empty() {
            return;
        }
        let entities = self.by_client.entry(client.clone()).or_default();
        for key in keys {
            entities.insert(key.clone());
            self.by_entity
                .entry(key.clone())
                .or_default()
                .insert(client.clone());
        }
    }

    fn unsubscribe_ids(&mut self, ids: &[EntityKey], client: &ClientId) {
        for id in ids {
            if let Some(clients) = self.by_entity.get_mut(id) {
                clients.remove(client);
                if clients.is_empty() {
                    self.by_entity.remove(id);
                }
            }
        }
        if let Some(entities) = self.by_client.get_mut(client) {
            for id in ids {
                entities.remove(id);
            }
            if entities.is_empty() {
                self.by_client.remove(client);
            }
        }
    }

    fn unsubscribe_all(&mut self, client: &ClientId) {
        let Some(entities) = self.by_client.remove(client) else {
            return;
        };
        for key in entities {
            if let Some(clients) = self.by_entity.get_mut(&key) {
                clients.remove(client);
                if clients.is_empty() {
                    self.by_entity.remove(&key);
                }
            }
        }
    }

    fn subscribers_of(&self, key: &EntityKey) -> Option<Vec<ClientId>> {
        self.by_entity
            .get(key)
            .map(|clients| clients.iter().cloned().collect())
    }

    fn clear(&mut self) {
        self.by_entity.clear();
        self.by_client.clear();
    }
}

/// An entity-keyed data source with per-entity client subscriptions.
///
/// Constructed with a data-source function that maps one request to an
/// [`EntityCollection`]. Every successful query subscribes the requesting
/// client to the entities it received (unless the request is just
/// browsing); producers later fan changes out with
/// [`publish_entities`](QueryableTable::publish_entities), reaching exactly
/// the clients subscribed to each changed entity.
pub struct QueryableTable<T> {
    source: Box<TableSource<T>>,
    subscriptions: Mutex<SubscriptionIndex>,
    binding: RwLock<Option<FrontBinding>>,
}

impl<T> QueryableTable<T> {
    /// Creates a table backed by the given data source.
    pub fn new(
        source: impl Fn(&TableRequest, &RequestContext) -> FrontResult<EntityCollection<T>>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        Self {
            source: Box::new(source),
            subscriptions: Mutex::new(SubscriptionIndex::default()),
            binding: RwLock::new(None),
        }
    }

    /// Runs the data source and subscribes the client to every entity it
    /// can see in the result.
    ///
    /// The source runs without the subscription lock held. A source error
    /// is returned verbatim and no subscription state is touched.
    pub fn query(
        &self,
        request: &TableRequest,
        ctx: &RequestContext,
    ) -> FrontResult<TableResponse> {
        let collection = (self.source)(request, ctx)?;
        let values = collection.visible_entries(ctx)?;
        if !request.just_browsing {
            let keys: Vec<EntityKey> = values.keys().cloned().collect();
            self.subscriptions.lock().subscribe(&ctx.client, &keys);
        }
        Ok(TableResponse::new(values))
    }

    /// Subscribes a client to entity keys it received through a query
    /// layered on this table.
    pub(crate) fn subscribe_for_response(&self, client: &ClientId, keys: &[EntityKey]) {
        self.subscriptions.lock().subscribe(client, keys);
    }

    /// Removes the named entity subscriptions for one client.
    ///
    /// Ids the client is not subscribed to are ignored.
    pub fn unsubscribe_ids(&self, ids: &[EntityKey], client: &ClientId) {
        self.subscriptions.lock().unsubscribe_ids(ids, client);
    }

    /// Removes every entity subscription one client holds. Used on
    /// disconnect.
    pub fn unsubscribe_all(&self, client: &ClientId) {
        self.subscriptions.lock().unsubscribe_all(client);
    }

    /// Fans the collection's entities out to their subscribed clients.
    ///
    /// Each entity present in the collection that has at least one
    /// subscriber is encoded once and enqueued as one patch per subscribed
    /// client; clients not subscribed to an entity receive nothing for it.
    pub fn publish_entities(&self, collection: &EntityCollection<T>) -> FrontResult<()> {
        let binding = self.require_binding()?;
        let keyed = collection.keyed();

        let targets: Vec<(EntityKey, &T, Vec<ClientId>)> = {
            let subscriptions = self.subscriptions.lock();
            keyed
                .into_iter()
                .filter_map(|(key, entity)| {
                    subscriptions
                        .subscribers_of(&key)
                        .map(|clients| (key, entity, clients))
                })
                .collect()
        };

        // Encode everything first so a failure enqueues nothing.
        let mut patches: Vec<(EntityKey, Value, Vec<ClientId>)> = Vec::with_capacity(targets.len());
        for (key, entity, clients) in targets {
            let encoded = collection.encode(entity)?;
            patches.push((key, encoded, clients));
        }

        debug!(path = %binding.path(), entities = patches.len(), "publishing entities");
        for (key, encoded, clients) in patches {
            for client in clients {
                binding.queue().push_table(
                    &client,
                    TablePatch::upsert(binding.path().clone(), key.clone(), encoded.clone()),
                );
            }
        }
        Ok(())
    }

    /// Fans deletion patches for the named entities out to their
    /// subscribed clients.
    pub fn unpublish_entities(&self, ids: &[EntityKey]) -> FrontResult<()> {
        let binding = self.require_binding()?;

        let targets: Vec<(EntityKey, Vec<ClientId>)> = {
            let subscriptions = self.subscriptions.lock();
            ids.iter()
                .filter_map(|id| {
                    subscriptions
                        .subscribers_of(id)
                        .map(|clients| (id.clone(), clients))
                })
                .collect()
        };

        debug!(path = %binding.path(), entities = targets.len(), "unpublishing entities");
        for (key, clients) in targets {
            for client in clients {
                binding
                    .queue()
                    .push_table(&client, TablePatch::deletion(binding.path().clone(), key.clone()));
            }
        }
        Ok(())
    }

    /// Returns true if the client is subscribed to the entity.
    pub fn is_subscribed(&self, client: &ClientId, key: &EntityKey) -> bool {
        self.subscriptions
            .lock()
            .by_entity
            .get(key)
            .is_some_and(|clients| clients.contains(client))
    }

    /// Returns the entity keys one client is subscribed to.
    pub fn subscriptions_of(&self, client: &ClientId) -> Vec<EntityKey> {
        self.subscriptions
            .lock()
            .by_client
            .get(client)
            .map(|keys| keys.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Returns the number of clients subscribed to the entity.
    pub fn subscriber_count(&self, key: &EntityKey) -> usize {
        self.subscriptions
            .lock()
            .by_entity
            .get(key)
            .map(HashSet::len)
            .unwrap_or(0)
    }

    fn require_binding(&self) -> FrontResult<FrontBinding> {
        self.binding.read().clone().ok_or(FrontError::NotAttached)
    }
}

impl<T> FrontResource for QueryableTable<T> {
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
        self.subscriptions.lock().clear();
    }
}

impl<T> TableResource for QueryableTable<T> {
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
        self.unsubscribe_ids(&request.ids, client);
        Ok(())
    }

    fn forget_client(&self, client: &ClientId) {
        self.unsubscribe_all(client);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::{EntityDescriptor, SerdeDescriptor};
    use crate::comms::Comms;
    use crate::delivery::DeliveryQueue;
    use datafront_protocol::{ResourcePath, UserId};
    use serde::Serialize;
    use std::sync::Arc;
    use std::time::Duration;

    #[derive(Debug, Clone, Serialize)]
    struct Base {
        id: u64,
        name: String,
        owner: String,
    }

    fn base(id: u64, owner: &str) -> Base {
        Base {
            id,
            name: format!("Base {id}"),
            owner: owner.to_string(),
        }
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

    fn test_queue() -> Arc<DeliveryQueue> {
        Arc::new(DeliveryQueue::new(
            Arc::new(NullComms),
            "data",
            Duration::from_millis(20),
        ))
    }

    fn descriptor() -> Arc<dyn EntityDescriptor<Base>> {
        Arc::new(SerdeDescriptor::new(|base: &Base| {
            EntityKey::new(base.id.to_string())
        }))
    }

    fn bases_table(entities: Vec<Base>) -> QueryableTable<Base> {
        let descriptor = descriptor();
        QueryableTable::new(move |request, _ctx| {
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
        })
    }

    fn attach(table: &QueryableTable<Base>, queue: &Arc<DeliveryQueue>) {
        table
            .attach(FrontBinding::new(
                ResourcePath::from("bases"),
                Arc::clone(queue),
            ))
            .unwrap();
    }

    fn ctx(client: &str) -> RequestContext {
        RequestContext::new(ClientId::new(client), UserId::new("user"))
    }

    fn request_for(ids: &[&str]) -> TableRequest {
        TableRequest::new(ResourcePath::from("bases"))
            .with_ids(ids.iter().map(|id| EntityKey::new(*id)).collect())
    }

    #[test]
    fn query_subscribes_client_to_returned_entities() {
        let table = bases_table(vec![base(12, "ada"), base(40, "brian")]);
        let ctx = ctx("A");

        let response = table.query(&request_for(&["12"]), &ctx).unwrap();

        assert_eq!(response.len(), 1);
        assert!(table.is_subscribed(&ctx.client, &EntityKey::new("12")));
        assert_eq!(table.subscriptions_of(&ctx.client), vec![EntityKey::new("12")]);
        assert!(!table.is_subscribed(&ctx.client, &EntityKey::new("40")));
    }

    #[test]
    fn just_browsing_skips_subscription() {
        let table = bases_table(vec![base(12, "ada")]);
        let ctx = ctx("A");

        let response = table
            .query(&request_for(&["12"]).browsing(), &ctx)
            .unwrap();

        assert_eq!(response.len(), 1);
        assert!(table.subscriptions_of(&ctx.client).is_empty());
    }

    #[test]
    fn repeated_subscription_is_idempotent() {
        let table = bases_table(vec![base(12, "ada")]);
        let ctx = ctx("A");

        table.query(&request_for(&["12"]), &ctx).unwrap();
        table.query(&request_for(&["12"]), &ctx).unwrap();

        assert_eq!(table.subscriber_count(&EntityKey::new("12")), 1);
    }

    #[test]
    fn unsubscribe_ids_clears_both_indexes() {
        let table = bases_table(vec![base(12, "ada"), base(40, "brian")]);
        let ctx = ctx("A");
        table.query(&request_for(&["12", "40"]), &ctx).unwrap();

        table.unsubscribe_ids(&[EntityKey::new("12")], &ctx.client);

        assert!(!table.is_subscribed(&ctx.client, &EntityKey::new("12")));
        assert_eq!(table.subscriber_count(&EntityKey::new("12")), 0);
        assert!(table.is_subscribed(&ctx.client, &EntityKey::new("40")));
    }

    #[test]
    fn unsubscribing_unknown_ids_is_a_noop() {
        let table = bases_table(vec![base(12, "ada")]);
        let ctx = ctx("A");
        table.query(&request_for(&["12"]), &ctx).unwrap();

        table.unsubscribe_ids(&[EntityKey::new("999")], &ctx.client);

        assert!(table.is_subscribed(&ctx.client, &EntityKey::new("12")));
    }

    #[test]
    fn unsubscribe_all_removes_every_entity() {
        let table = bases_table(vec![base(12, "ada"), base(40, "brian")]);
        let ctx = ctx("A");
        table.query(&request_for(&[]), &ctx).unwrap();

        table.unsubscribe_all(&ctx.client);

        assert!(table.subscriptions_of(&ctx.client).is_empty());
        assert_eq!(table.subscriber_count(&EntityKey::new("12")), 0);
        assert_eq!(table.subscriber_count(&EntityKey::new("40")), 0);
    }

    #[test]
    fn source_error_leaves_state_untouched() {
        let table: QueryableTable<Base> =
            QueryableTable::new(|_request, _ctx| Err(FrontError::source("backend down".to_string())));
        let ctx = ctx("A");

        let result = table.query(&request_for(&["12"]), &ctx);

        assert!(result.unwrap_err().is_source_error());
        assert!(table.subscriptions_of(&ctx.client).is_empty());
    }

    #[test]
    fn publish_targets_only_subscribed_clients() {
        let queue = test_queue();
        let table = bases_table(vec![base(1, "ada"), base(2, "brian")]);
        attach(&table, &queue);

        let a = ctx("A");
        let b = ctx("B");
        table.query(&request_for(&["1"]), &a).unwrap();
        table.query(&request_for(&["2"]), &b).unwrap();

        let collection = EntityCollection::new(descriptor(), vec![base(1, "ada")]);
        table.publish_entities(&collection).unwrap();

        assert_eq!(queue.pending_count(&a.client), 1);
        assert_eq!(queue.pending_count(&b.client), 0);
    }

    #[test]
    fn publish_without_subscribers_enqueues_nothing() {
        let queue = test_queue();
        let table = bases_table(vec![base(1, "ada")]);
        attach(&table, &queue);

        let collection = EntityCollection::new(descriptor(), vec![base(1, "ada")]);
        table.publish_entities(&collection).unwrap();

        assert_eq!(queue.phase(), crate::delivery::QueuePhase::Idle);
    }

    #[test]
    fn unpublish_reaches_subscribers_of_each_id() {
        let queue = test_queue();
        let table = bases_table(vec![base(1, "ada"), base(2, "brian")]);
        attach(&table, &queue);

        let a = ctx("A");
        table.query(&request_for(&["1"]), &a).unwrap();

        table
            .unpublish_entities(&[EntityKey::new("1"), EntityKey::new("2")])
            .unwrap();

        assert_eq!(queue.pending_count(&a.client), 1);
    }

    #[test]
    fn publish_before_attach_fails() {
        let table = bases_table(vec![base(1, "ada")]);
        let collection = EntityCollection::new(descriptor(), vec![base(1, "ada")]);

        let result = table.publish_entities(&collection);

        assert!(matches!(result, Err(FrontError::NotAttached)));
    }

    #[test]
    fn attaching_twice_fails() {
        let queue = test_queue();
        let table = bases_table(vec![]);
        attach(&table, &queue);

        let result = table.attach(FrontBinding::new(
            ResourcePath::from("other"),
            Arc::clone(&queue),
        ));

        assert!(matches!(result, Err(FrontError::AlreadyAttached)));
    }

    struct OwnerOnly;

    impl EntityDescriptor<Base> for OwnerOnly {
        fn key(&self, entity: &Base) -> EntityKey {
            EntityKey::new(entity.id.to_string())
        }

        fn encode(&self, entity: &Base) -> FrontResult<Value> {
            Ok(serde_json::to_value(entity)?)
        }

        fn encode_for(&self, entity: &Base, ctx: &RequestContext) -> FrontResult<Option<Value>> {
            if entity.owner == ctx.user.as_str() {
                self.encode(entity).map(Some)
            } else {
                Ok(None)
            }
        }
    }

    #[test]
    fn hidden_entities_are_never_subscribed() {
        let entities = vec![base(1, "user"), base(2, "rival")];
        let table = QueryableTable::new(move |_request, _ctx| {
            Ok(EntityCollection::new(
                Arc::new(OwnerOnly) as Arc<dyn EntityDescriptor<Base>>,
                entities.clone(),
            ))
        });
        let ctx = ctx("A");

        let response = table.query(&request_for(&[]), &ctx).unwrap();

        assert_eq!(response.len(), 1);
        assert!(response.values.contains_key(&EntityKey::new("1")));
        assert!(table.is_subscribed(&ctx.client, &EntityKey::new("1")));
        assert!(!table.is_subscribed(&ctx.client, &EntityKey::new("2")));
    }

    #[test]
    fn dispose_clears_subscriptions() {
        let table = bases_table(vec![base(12, "ada")]);
        let ctx = ctx("A");
        table.query(&request_for(&["12"]), &ctx).unwrap();

        table.dispose();

        assert!(table.subscriptions_of(&ctx.client).is_empty());
    }

    #[test]
    fn deletion_patch_content_is_empty() {
        let patch = TablePatch::deletion(ResourcePath::from("bases"), EntityKey::new("1"));
        assert!(patch.is_deletion());
        assert_eq!(serde_json::to_value(&patch).unwrap().get("update"), None);
    }
}
