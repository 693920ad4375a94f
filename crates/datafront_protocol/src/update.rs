//! Outbound push envelopes.

use crate::ids::EntityKey;
use crate::path::ResourcePath;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One entity change pushed to a subscribed client.
///
/// An absent `update` signals that the entity was deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TablePatch {
    /// Path of the table the entity belongs to.
    pub path: ResourcePath,
    /// Key of the changed entity.
    pub entity_id: EntityKey,
    /// New encoded entity, or absent on deletion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update: Option<Value>,
}

impl TablePatch {
    /// Creates an upsert patch carrying the new encoded entity.
    pub fn upsert(path: ResourcePath, entity_id: EntityKey, update: Value) -> Self {
        Self {
            path,
            entity_id,
            update: Some(update),
        }
    }

    /// Creates a deletion patch.
    pub fn deletion(path: ResourcePath, entity_id: EntityKey) -> Self {
        Self {
            path,
            entity_id,
            update: None,
        }
    }

    /// Returns true if the patch signals a deletion.
    #[must_use]
    pub fn is_deletion(&self) -> bool {
        self.update.is_none()
    }
}

/// A whole-value singleton replacement pushed to a subscribed client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SingletonPatch {
    /// Path of the singleton.
    pub path: ResourcePath,
    /// The new encoded value.
    pub update: Value,
}

impl SingletonPatch {
    /// Creates a singleton patch.
    pub fn new(path: ResourcePath, update: Value) -> Self {
        Self { path, update }
    }
}

/// An invalidation notice for one query parameter.
///
/// Carries no data; the client re-runs the query if it still cares.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryNotification {
    /// Path of the query.
    pub path: ResourcePath,
    /// The parameter payload whose results changed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

impl QueryNotification {
    /// Creates a query notification.
    pub fn new(path: ResourcePath, payload: Option<Value>) -> Self {
        Self { path, payload }
    }
}

/// One outbound `update` event for one client.
///
/// Batches everything queued for that client during a debounce window; each
/// list preserves arrival order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateFrame {
    /// Entity changes, in arrival order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub table_patches: Vec<TablePatch>,
    /// Singleton replacements, in arrival order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub singleton_patches: Vec<SingletonPatch>,
    /// Query invalidations, in arrival order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub query_notifications: Vec<QueryNotification>,
}

impl UpdateFrame {
    /// Returns true if the frame carries nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.table_patches.is_empty()
            && self.singleton_patches.is_empty()
            && self.query_notifications.is_empty()
    }
}
