//! Per-request context.

use datafront_protocol::{ClientId, DispatcherCommand, UserId};
use std::time::SystemTime;

/// Identity and receipt data for one inbound request.
///
/// Built from the dispatcher envelope when a request arrives and handed to
/// data sources and access hooks. Never persisted; subscription state keys
/// only on the client id.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Session the request came from.
    pub client: ClientId,
    /// Authenticated user behind the session.
    pub user: UserId,
    /// When the sync core accepted the request.
    pub received_at: SystemTime,
}

impl RequestContext {
    /// Creates a context for the given identities, stamped with the current
    /// time.
    pub fn new(client: ClientId, user: UserId) -> Self {
        Self {
            client,
            user,
            received_at: SystemTime::now(),
        }
    }
}

impl From<&DispatcherCommand> for RequestContext {
    fn from(command: &DispatcherCommand) -> Self {
        Self::new(command.client.clone(), command.acting_user.clone())
    }
}
