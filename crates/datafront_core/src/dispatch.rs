//! Inbound command routing seam.

use crate::error::FrontResult;
use datafront_protocol::{DispatcherCommand, ResponseBody};
use std::sync::Arc;

/// The host's command dispatcher.
///
/// The dispatcher owns inbound connections, parses raw client messages into
/// [`DispatcherCommand`]s, and routes each to the handler registered for its
/// scope. The sync core registers itself as one such handler.
pub trait Dispatcher {
    /// Registers a handler for every command arriving on a scope.
    fn register_handler(&self, scope: &str, handler: Arc<dyn CommandHandler>);
}

/// A scope handler receiving dispatcher commands.
pub trait CommandHandler: Send + Sync {
    /// Handles one inbound command, returning the response body to send
    /// back to the requesting client.
    fn handle(&self, command: &DispatcherCommand) -> FrontResult<ResponseBody>;
}
