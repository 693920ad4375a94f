//! Typed entity collections and their wire descriptors.

use crate::context::RequestContext;
use crate::error::FrontResult;
use datafront_protocol::EntityKey;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::sync::Arc;

/// Describes how a table's entities are identified and encoded.
///
/// One descriptor is shared by every collection a data source returns for
/// its table. The per-requester view lets a descriptor hide an entity from
/// a client entirely or encode a restricted projection of it.
pub trait EntityDescriptor<T>: Send + Sync {
    /// Derives the entity's key within its table.
    fn key(&self, entity: &T) -> EntityKey;

    /// Encodes the entity for the wire. Used on the publish path, where no
    /// requester is involved.
    fn encode(&self, entity: &T) -> FrontResult<Value>;

    /// Encodes the entity as seen by one requester.
    ///
    /// Returning `Ok(None)` hides the entity from this requester: it is
    /// dropped from the response and never subscribed. The default view is
    /// the plain encoding.
    fn encode_for(&self, entity: &T, ctx: &RequestContext) -> FrontResult<Option<Value>> {
        let _ = ctx;
        self.encode(entity).map(Some)
    }
}

/// Descriptor for `Serialize` entities keyed by a field accessor.
///
/// Covers the common case where the wire form is the entity's plain serde
/// encoding and every requester may see every entity.
pub struct SerdeDescriptor<T> {
    key: Box<dyn Fn(&T) -> EntityKey + Send + Sync>,
    _entity: PhantomData<fn(&T)>,
}

impl<T> SerdeDescriptor<T> {
    /// Creates a descriptor deriving keys with the given accessor.
    pub fn new(key: impl Fn(&T) -> EntityKey + Send + Sync + 'static) -> Self {
        Self {
            key: Box::new(key),
            _entity: PhantomData,
        }
    }
}

impl<T: Serialize> EntityDescriptor<T> for SerdeDescriptor<T> {
    fn key(&self, entity: &T) -> EntityKey {
        (self.key)(entity)
    }

    fn encode(&self, entity: &T) -> FrontResult<Value> {
        Ok(serde_json::to_value(entity)?)
    }
}

/// A typed container of domain entities plus the descriptor that puts them
/// on the wire.
///
/// Data sources build one per query invocation; producers build one per
/// publish. The same descriptor instance is shared across all of a table's
/// collections.
pub struct EntityCollection<T> {
    descriptor: Arc<dyn EntityDescriptor<T>>,
    entities: Vec<T>,
}

impl<T> EntityCollection<T> {
    /// Creates a collection over the given entities.
    pub fn new(descriptor: Arc<dyn EntityDescriptor<T>>, entities: Vec<T>) -> Self {
        Self {
            descriptor,
            entities,
        }
    }

    /// Creates an empty collection.
    pub fn empty(descriptor: Arc<dyn EntityDescriptor<T>>) -> Self {
        Self::new(descriptor, Vec::new())
    }

    /// Returns the entities.
    #[must_use]
    pub fn entities(&self) -> &[T] {
        &self.entities
    }

    /// Returns the number of entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Returns true if the collection holds no entities.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Returns each entity paired with its key.
    pub fn keyed(&self) -> Vec<(EntityKey, &T)> {
        self.entities
            .iter()
            .map(|entity| (self.descriptor.key(entity), entity))
            .collect()
    }

    /// Encodes one entity with no per-requester view applied.
    pub fn encode(&self, entity: &T) -> FrontResult<Value> {
        self.descriptor.encode(entity)
    }

    /// Encodes every entity as seen by one requester.
    ///
    /// Entities the descriptor hides for this requester are dropped.
    pub fn visible_entries(&self, ctx: &RequestContext) -> FrontResult<BTreeMap<EntityKey, Value>> {
        let mut entries = BTreeMap::new();
        for entity in &self.entities {
            if let Some(encoded) = self.descriptor.encode_for(entity, ctx)? {
                entries.insert(self.descriptor.key(entity), encoded);
            }
        }
        Ok(entries)
    }

    /// Encodes every entity with no per-requester view applied.
    pub fn raw_entries(&self) -> FrontResult<BTreeMap<EntityKey, Value>> {
        let mut entries = BTreeMap::new();
        for entity in &self.entities {
            entries.insert(
                self.descriptor.key(entity),
                self.descriptor.encode(entity)?,
            );
        }
        Ok(entries)
    }
}
