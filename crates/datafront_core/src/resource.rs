//! Attachment lifecycle and registry-facing resource surfaces.

use crate::context::RequestContext;
use crate::delivery::DeliveryQueue;
use crate::error::FrontResult;
use datafront_protocol::{
    ActionRequest, ClientId, ResourcePath, SingletonRequest, SingletonResponse, TableRequest,
    TableResponse, TableUnsubscribeRequest, UserId,
};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Handle a resource receives when attached to a registry.
///
/// Carries the path the resource lives under and the delivery queue its
/// publishes go through. Dropped again on detach.
#[derive(Clone)]
pub struct FrontBinding {
    path: ResourcePath,
    queue: Arc<DeliveryQueue>,
}

impl FrontBinding {
    pub(crate) fn new(path: ResourcePath, queue: Arc<DeliveryQueue>) -> Self {
        Self { path, queue }
    }

    /// Path the resource is attached under.
    #[must_use]
    pub fn path(&self) -> &ResourcePath {
        &self.path
    }

    pub(crate) fn queue(&self) -> &Arc<DeliveryQueue> {
        &self.queue
    }
}

impl fmt::Debug for FrontBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrontBinding")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

/// Lifecycle surface shared by every attachable resource.
///
/// Each resource is created once, attached under exactly one path, and torn
/// down via [`dispose`](FrontResource::dispose). Attaching an instance that
/// is already bound is a setup error, not a panic.
pub trait FrontResource: Send + Sync {
    /// Binds the resource to a registry path.
    fn attach(&self, binding: FrontBinding) -> FrontResult<()>;

    /// Clears the binding. Publishing afterwards fails until re-attached.
    fn detach(&self);

    /// Clears all state the resource holds (subscriptions, tokens).
    fn dispose(&self);
}

/// Surface the registry dispatches `table` and `-table` commands to.
///
/// Implemented by both plain tables and parameterized table queries; the
/// registry probes its table registry first, then its query registry.
pub trait TableResource: FrontResource {
    /// Handles a read-and-subscribe request.
    fn handle_query(
        &self,
        request: &TableRequest,
        ctx: &RequestContext,
    ) -> FrontResult<TableResponse>;

    /// Handles an unsubscribe request.
    fn handle_unsubscribe(
        &self,
        request: &TableUnsubscribeRequest,
        client: &ClientId,
    ) -> FrontResult<()>;

    /// Drops every subscription the client holds on this resource.
    fn forget_client(&self, client: &ClientId);
}

/// Surface the registry dispatches `singleton` and `-singleton` commands to.
pub trait SingletonResource: FrontResource {
    /// Handles a read-and-subscribe request.
    fn handle_query(
        &self,
        request: &SingletonRequest,
        ctx: &RequestContext,
    ) -> FrontResult<SingletonResponse>;

    /// Drops the client's subscription.
    fn forget_client(&self, client: &ClientId);
}

/// Surface the registry dispatches `action` commands to.
pub trait ActionResource: FrontResource {
    /// Runs the action for one request.
    fn handle_run(&self, request: &ActionRequest, acting_user: &UserId) -> FrontResult<Value>;

    /// Purges idempotency tokens older than the action's token lifetime.
    /// Driven by the registry's periodic sweep.
    fn clean_up(&self);
}
