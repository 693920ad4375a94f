//! Single-value data sources with whole-value updates.

use crate::context::RequestContext;
use crate::error::{FrontError, FrontResult};
use crate::resource::{FrontBinding, FrontResource, SingletonResource};
use datafront_protocol::{ClientId, SingletonPatch, SingletonRequest, SingletonResponse};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::HashSet;
use tracing::debug;

/// Data source signature for a singleton.
type SingletonSource<V> = dyn Fn(&RequestContext) -> FrontResult<V> + Send + Sync;

/// A single-value data source clients subscribe to as a whole.
///
/// There is no per-entity tracking: a successful query subscribes the
/// client to the value itself, and
/// [`publish_update`](QueryableSingleton::publish_update) sends the full
/// replacement value to every subscriber.
pub struct QueryableSingleton<V> {
    source: Box<SingletonSource<V>>,
    subscribers: Mutex<HashSet<ClientId>>,
    binding: RwLock<Option<FrontBinding>>,
}

impl<V> QueryableSingleton<V>
where
    V: Serialize,
{
    /// Creates a singleton backed by the given data source.
    pub fn new(source: impl Fn(&RequestContext) -> FrontResult<V> + Send + Sync + 'static) -> Self {
        Self {
            source: Box::new(source),
            subscribers: Mutex::new(HashSet::new()),
            binding: RwLock::new(None),
        }
    }

    /// Runs the data source and subscribes the client to the value.
    ///
    /// A source error is returned verbatim and no subscription is
    /// recorded. When the request is just browsing, the value is returned
    /// without subscribing.
    pub fn query(
        &self,
        request: &SingletonRequest,
        ctx: &RequestContext,
    ) -> FrontResult<SingletonResponse> {
        let value = (self.source)(ctx)?;
        let encoded = serde_json::to_value(&value)?;
        if !request.just_browsing {
            self.subscribers.lock().insert(ctx.client.clone());
        }
        Ok(SingletonResponse::new(encoded))
    }

    /// Sends the replacement value to every subscribed client.
    ///
    /// The value is encoded once; the data source is not consulted.
    pub fn publish_update(&self, value: &V) -> FrontResult<()> {
        let binding = self.require_binding()?;
        let encoded = serde_json::to_value(value)?;
        let subscribers: Vec<ClientId> = self.subscribers.lock().iter().cloned().collect();
        debug!(path = %binding.path(), subscribers = subscribers.len(), "publishing singleton update");
        for client in subscribers {
            binding.queue().push_singleton(
                &client,
                SingletonPatch::new(binding.path().clone(), encoded.clone()),
            );
        }
        Ok(())
    }

    /// Removes one client's subscription.
    pub fn unsubscribe(&self, client: &ClientId) {
        self.subscribers.lock().remove(client);
    }

    /// Returns true if the client is subscribed.
    pub fn is_subscribed(&self, client: &ClientId) -> bool {
        self.subscribers.lock().contains(client)
    }

    /// Returns the number of subscribed clients.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    fn require_binding(&self) -> FrontResult<FrontBinding> {
        self.binding.read().clone().ok_or(FrontError::NotAttached)
    }
}

impl<V> FrontResource for QueryableSingleton<V>
where
    V: Serialize,
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
        self.subscribers.lock().clear();
    }
}

impl<V> SingletonResource for QueryableSingleton<V>
where
    V: Serialize,
{
    fn handle_query(
        &self,
        request: &SingletonRequest,
        ctx: &RequestContext,
    ) -> FrontResult<SingletonResponse> {
        self.query(request, ctx)
    }

    fn forget_client(&self, client: &ClientId) {
        self.unsubscribe(client);
    }
}
