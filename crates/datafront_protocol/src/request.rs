//! Inbound request envelopes.

use crate::ids::{ClientId, EntityKey, UserId};
use crate::path::ResourcePath;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// The closed set of wire discriminators a dispatcher command may carry.
///
/// `Log` and `LogUnsubscribe` are reserved by the protocol but have no
/// server-side implementation; dispatching them fails explicitly rather than
/// silently succeeding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    /// Read a table or table query and subscribe (`table`).
    Table,
    /// Drop table or query subscriptions (`-table`).
    TableUnsubscribe,
    /// Read a singleton and subscribe (`singleton`).
    Singleton,
    /// Drop a singleton subscription (`-singleton`).
    SingletonUnsubscribe,
    /// Invoke an action (`action`).
    Action,
    /// Subscribe to a log stream (`log`, reserved).
    Log,
    /// Drop a log subscription (`-log`, reserved).
    LogUnsubscribe,
}

impl RequestKind {
    /// Parses a wire discriminator string.
    #[must_use]
    pub fn from_wire(text: &str) -> Option<Self> {
        match text {
            "table" => Some(RequestKind::Table),
            "-table" => Some(RequestKind::TableUnsubscribe),
            "singleton" => Some(RequestKind::Singleton),
            "-singleton" => Some(RequestKind::SingletonUnsubscribe),
            "action" => Some(RequestKind::Action),
            "log" => Some(RequestKind::Log),
            "-log" => Some(RequestKind::LogUnsubscribe),
            _ => None,
        }
    }

    /// Returns the wire discriminator string.
    #[must_use]
    pub const fn as_wire(self) -> &'static str {
        match self {
            RequestKind::Table => "table",
            RequestKind::TableUnsubscribe => "-table",
            RequestKind::Singleton => "singleton",
            RequestKind::SingletonUnsubscribe => "-singleton",
            RequestKind::Action => "action",
            RequestKind::Log => "log",
            RequestKind::LogUnsubscribe => "-log",
        }
    }
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_wire())
    }
}

/// Read-and-subscribe request against a table or table query.
///
/// Plain tables use `ids` (empty means every visible entity); parameterized
/// queries use `payload` as the query parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableRequest {
    /// Path the table or query is attached under.
    pub path: ResourcePath,
    /// Entity keys to read; empty selects the whole visible table.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ids: Vec<EntityKey>,
    /// Opaque query parameter for parameterized queries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    /// When true, read without recording any subscription.
    #[serde(default)]
    pub just_browsing: bool,
}

impl TableRequest {
    /// Creates a whole-table request.
    pub fn new(path: ResourcePath) -> Self {
        Self {
            path,
            ids: Vec::new(),
            payload: None,
            just_browsing: false,
        }
    }

    /// Restricts the request to the given entity keys.
    #[must_use]
    pub fn with_ids(mut self, ids: Vec<EntityKey>) -> Self {
        self.ids = ids;
        self
    }

    /// Attaches a query parameter payload.
    #[must_use]
    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Marks the request as read-only browsing.
    #[must_use]
    pub fn browsing(mut self) -> Self {
        self.just_browsing = true;
        self
    }
}

/// Unsubscribe request against a table or table query.
///
/// For plain tables `ids` names the per-entity subscriptions to drop; for
/// queries `payload` names the parameter whose listener entry to drop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableUnsubscribeRequest {
    /// Path the table or query is attached under.
    pub path: ResourcePath,
    /// Entity keys whose subscriptions to drop.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ids: Vec<EntityKey>,
    /// Query parameter whose listener entry to drop.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

impl TableUnsubscribeRequest {
    /// Creates an unsubscribe request for the given entity keys.
    pub fn for_ids(path: ResourcePath, ids: Vec<EntityKey>) -> Self {
        Self {
            path,
            ids,
            payload: None,
        }
    }

    /// Creates an unsubscribe request for a query parameter.
    pub fn for_payload(path: ResourcePath, payload: Value) -> Self {
        Self {
            path,
            ids: Vec::new(),
            payload: Some(payload),
        }
    }
}

/// Read-and-subscribe request against a singleton.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SingletonRequest {
    /// Path the singleton is attached under.
    pub path: ResourcePath,
    /// When true, read without recording any subscription.
    #[serde(default)]
    pub just_browsing: bool,
}

impl SingletonRequest {
    /// Creates a singleton request.
    pub fn new(path: ResourcePath) -> Self {
        Self {
            path,
            just_browsing: false,
        }
    }

    /// Marks the request as read-only browsing.
    #[must_use]
    pub fn browsing(mut self) -> Self {
        self.just_browsing = true;
        self
    }
}

/// Unsubscribe request against a singleton.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SingletonUnsubscribeRequest {
    /// Path the singleton is attached under.
    pub path: ResourcePath,
}

impl SingletonUnsubscribeRequest {
    /// Creates a singleton unsubscribe request.
    pub fn new(path: ResourcePath) -> Self {
        Self { path }
    }
}

/// Invocation request against an action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionRequest {
    /// Stringified path the action is attached under.
    pub name: String,
    /// Client-generated token deduplicating retries of one logical call.
    pub idempotency_token: String,
    /// Parameter payload decoded by the action.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

impl ActionRequest {
    /// Creates an action request.
    pub fn new(
        name: impl Into<String>,
        idempotency_token: impl Into<String>,
        payload: Option<Value>,
    ) -> Self {
        Self {
            name: name.into(),
            idempotency_token: idempotency_token.into(),
            payload,
        }
    }
}

/// Envelope the command dispatcher delivers for one inbound client request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatcherCommand {
    /// Correlation id assigned by the transport.
    pub id: String,
    /// Session that sent the request.
    pub client: ClientId,
    /// Authenticated user behind the session.
    pub acting_user: UserId,
    /// Dispatcher scope the command was routed on.
    pub scope: String,
    /// Wire discriminator, one of the [`RequestKind`] strings.
    pub command: String,
    /// Request body, shaped per discriminator.
    pub payload: Value,
}

impl DispatcherCommand {
    /// Creates a dispatcher command.
    pub fn new(
        id: impl Into<String>,
        client: ClientId,
        acting_user: UserId,
        scope: impl Into<String>,
        command: impl Into<String>,
        payload: Value,
    ) -> Self {
        Self {
            id: id.into(),
            client,
            acting_user,
            scope: scope.into(),
            command: command.into(),
            payload,
        }
    }

    /// Parses the wire discriminator.
    #[must_use]
    pub fn kind(&self) -> Option<RequestKind> {
        RequestKind::from_wire(&self.command)
    }
}
