//! An in-process dispatcher double.

use datafront_core::{CommandHandler, Dispatcher, FrontResult};
use datafront_protocol::{DispatcherCommand, ResponseBody};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Routes commands to registered scope handlers without any transport.
#[derive(Default)]
pub struct LoopbackDispatcher {
    handlers: Mutex<HashMap<String, Arc<dyn CommandHandler>>>,
}

impl LoopbackDispatcher {
    /// Creates an empty dispatcher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Routes one command to the handler registered for its scope.
    ///
    /// Panics if no handler is registered; that is a fixture wiring
    /// mistake, not a scenario under test.
    pub fn dispatch(&self, command: &DispatcherCommand) -> FrontResult<ResponseBody> {
        let handler = self
            .handlers
            .lock()
            .get(&command.scope)
            .cloned()
            .expect("No handler registered for scope");
        handler.handle(command)
    }

    /// Number of scopes with a registered handler.
    pub fn handler_count(&self) -> usize {
        self.handlers.lock().len()
    }
}

impl Dispatcher for LoopbackDispatcher {
    fn register_handler(&self, scope: &str, handler: Arc<dyn CommandHandler>) {
        self.handlers.lock().insert(scope.to_string(), handler);
    }
}
