//! Invocable actions with idempotency-token deduplication.

use crate::error::{FrontError, FrontResult};
use crate::resource::{ActionResource, FrontBinding, FrontResource};
use datafront_protocol::{ActionRequest, UserId};
use parking_lot::{Mutex, RwLock};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::debug;

/// How long a spent idempotency token blocks reuse.
const DEFAULT_TOKEN_LIFETIME: Duration = Duration::from_secs(15 * 60);

/// Handler signature for an action.
type ActionHandler<P, R> = dyn Fn(P, &UserId) -> FrontResult<R> + Send + Sync;

/// Idempotency tokens seen by one action, with the instant each was
/// claimed.
#[derive(Debug, Default)]
struct TokenLedger {
    seen: HashMap<String, Instant>,
}

impl TokenLedger {
    /// Records the token unless it is already claimed and unexpired.
    fn claim(&mut self, token: &str, lifetime: Duration, now: Instant) -> bool {
        if let Some(at) = self.seen.get(token) {
            if now.duration_since(*at) < lifetime {
                return false;
            }
        }
        self.seen.insert(token.to_string(), now);
        true
    }

    fn purge_expired(&mut self, lifetime: Duration, now: Instant) {
        self.seen.retain(|_, at| now.duration_since(*at) < lifetime);
    }

    fn len(&self) -> usize {
        self.seen.len()
    }

    fn clear(&mut self) {
        self.seen.clear();
    }
}

/// A named server-side operation clients invoke through the dispatcher.
///
/// Every invocation carries a client-generated idempotency token. Within
/// the token lifetime, a retry with the same token is rejected with
/// [`FrontError::DuplicateToken`] instead of running the handler again.
///
/// Invocations of one action are serialized: decoding, token
/// deduplication, and the handler itself run under a single exclusive
/// lock, so two retries racing each other cannot both claim a token.
pub struct Action<P, R> {
    handler: Box<ActionHandler<P, R>>,
    slot: Mutex<TokenLedger>,
    token_lifetime: Duration,
    binding: RwLock<Option<FrontBinding>>,
}

impl<P, R> Action<P, R>
where
    P: DeserializeOwned,
    R: Serialize,
{
    /// Creates an action with the given handler and the default token
    /// lifetime.
    pub fn new(handler: impl Fn(P, &UserId) -> FrontResult<R> + Send + Sync + 'static) -> Self {
        Self {
            handler: Box::new(handler),
            slot: Mutex::new(TokenLedger::default()),
            token_lifetime: DEFAULT_TOKEN_LIFETIME,
            binding: RwLock::new(None),
        }
    }

    /// Overrides how long spent tokens block reuse.
    #[must_use]
    pub fn with_token_lifetime(mut self, lifetime: Duration) -> Self {
        self.token_lifetime = lifetime;
        self
    }

    /// Decodes the payload, claims the idempotency token, and invokes the
    /// handler.
    ///
    /// The whole sequence holds the action's lock, so invocations of one
    /// action never overlap. A payload that fails to decode claims no
    /// token; once decoding succeeds the token is claimed before the
    /// handler runs, so a handler error still blocks retries with the
    /// same token.
    pub fn run(&self, request: &ActionRequest, acting_user: &UserId) -> FrontResult<Value> {
        let mut ledger = self.slot.lock();
        let payload = request.payload.clone().unwrap_or(Value::Null);
        let param: P = serde_json::from_value(payload)?;
        if !ledger.claim(&request.idempotency_token, self.token_lifetime, Instant::now()) {
            return Err(FrontError::DuplicateToken {
                token: request.idempotency_token.clone(),
            });
        }
        let result = (self.handler)(param, acting_user)?;
        Ok(serde_json::to_value(result)?)
    }

    /// Forgets tokens older than the token lifetime.
    pub fn clean_up(&self) {
        let mut ledger = self.slot.lock();
        let before = ledger.len();
        ledger.purge_expired(self.token_lifetime, Instant::now());
        let purged = before - ledger.len();
        if purged > 0 {
            debug!(purged, "purged expired idempotency tokens");
        }
    }

    /// Returns the number of tokens currently claimed.
    pub fn token_count(&self) -> usize {
        self.slot.lock().len()
    }
}

impl<P, R> FrontResource for Action<P, R>
where
    P: DeserializeOwned,
    R: Serialize,
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
        self.slot.lock().clear();
    }
}

impl<P, R> ActionResource for Action<P, R>
where
    P: DeserializeOwned,
    R: Serialize,
{
    fn handle_run(&self, request: &ActionRequest, acting_user: &UserId) -> FrontResult<Value> {
        self.run(request, acting_user)
    }

    fn clean_up(&self) {
        Action::clean_up(self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Debug, Deserialize)]
    struct RenameBase {
        id: u64,
        to: String,
    }

    #[derive(Debug, Serialize)]
    struct RenameReceipt {
        id: u64,
        name: String,
    }

    fn rename_action() -> Action<RenameBase, RenameReceipt> {
        Action::new(|param: RenameBase, _user: &UserId| {
            Ok(RenameReceipt {
                id: param.id,
                name: param.to,
            })
        })
    }

    fn user() -> UserId {
        UserId::new("ada")
    }

    fn request(token: &str, payload: Option<Value>) -> ActionRequest {
        ActionRequest::new("bases/rename", token, payload)
    }

    #[test]
    fn run_decodes_invokes_and_encodes() {
        let action = rename_action();

        let result = action
            .run(
                &request("t-1", Some(json!({"id": 12, "to": "North Keep"}))),
                &user(),
            )
            .unwrap();

        assert_eq!(result, json!({"id": 12, "name": "North Keep"}));
    }

    #[test]
    fn missing_payload_decodes_as_null() {
        let calls = Arc::new(AtomicUsize::new(0));
        let action = Action::new({
            let calls = Arc::clone(&calls);
            move |_param: (), _user: &UserId| {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(json!("done"))
            }
        });

        action.run(&request("t-1", None), &user()).unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn duplicate_token_runs_the_handler_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let action = Action::new({
            let calls = Arc::clone(&calls);
            move |_param: (), _user: &UserId| {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(json!("done"))
            }
        });

        action.run(&request("t-1", None), &user()).unwrap();
        let retry = action.run(&request("t-1", None), &user());

        assert!(matches!(retry, Err(FrontError::DuplicateToken { token }) if token == "t-1"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn distinct_tokens_both_run() {
        let action = rename_action();

        action
            .run(&request("t-1", Some(json!({"id": 1, "to": "A"}))), &user())
            .unwrap();
        action
            .run(&request("t-2", Some(json!({"id": 1, "to": "B"}))), &user())
            .unwrap();

        assert_eq!(action.token_count(), 2);
    }

    #[test]
    fn decode_failure_claims_no_token() {
        let action = rename_action();

        let bad = action.run(&request("t-1", Some(json!({"id": "twelve"}))), &user());
        assert!(matches!(bad, Err(FrontError::Decode { .. })));

        action
            .run(&request("t-1", Some(json!({"id": 12, "to": "Keep"}))), &user())
            .unwrap();
    }

    #[test]
    fn handler_error_still_claims_the_token() {
        let action: Action<(), Value> =
            Action::new(|_param, _user| Err(FrontError::source("refused".to_string())));

        let first = action.run(&request("t-1", None), &user());
        assert!(first.unwrap_err().is_source_error());

        let retry = action.run(&request("t-1", None), &user());
        assert!(matches!(retry, Err(FrontError::DuplicateToken { .. })));
    }

    #[test]
    fn expired_token_can_be_reused() {
        let action: Action<(), Value> = Action::new(|_param, _user| Ok(json!("done")))
            .with_token_lifetime(Duration::from_millis(5));

        action.run(&request("t-1", None), &user()).unwrap();
        std::thread::sleep(Duration::from_millis(10));

        action.run(&request("t-1", None), &user()).unwrap();
    }

    #[test]
    fn clean_up_purges_expired_tokens() {
        let action: Action<(), Value> = Action::new(|_param, _user| Ok(json!("done")))
            .with_token_lifetime(Duration::from_millis(5));

        action.run(&request("t-1", None), &user()).unwrap();
        assert_eq!(action.token_count(), 1);
        std::thread::sleep(Duration::from_millis(10));

        action.clean_up();

        assert_eq!(action.token_count(), 0);
    }

    #[test]
    fn invocations_never_overlap() {
        let inside = Arc::new(AtomicBool::new(false));
        let overlapped = Arc::new(AtomicBool::new(false));
        let action = Arc::new(Action::new({
            let inside = Arc::clone(&inside);
            let overlapped = Arc::clone(&overlapped);
            move |_param: (), _user: &UserId| {
                if inside.swap(true, Ordering::SeqCst) {
                    overlapped.store(true, Ordering::SeqCst);
                }
                std::thread::sleep(Duration::from_millis(5));
                inside.store(false, Ordering::SeqCst);
                Ok(json!("done"))
            }
        }));

        std::thread::scope(|scope| {
            for index in 0..4 {
                let action = Arc::clone(&action);
                scope.spawn(move || {
                    let _ = action.run(&request(&format!("t-{index}"), None), &user());
                });
            }
        });

        assert!(!overlapped.load(Ordering::SeqCst));
    }

    #[test]
    fn dispose_clears_claimed_tokens() {
        let action = rename_action();
        action
            .run(&request("t-1", Some(json!({"id": 1, "to": "A"}))), &user())
            .unwrap();

        action.dispose();

        assert_eq!(action.token_count(), 0);
    }
}
