//! # DataFront Core
//!
//! Subscription tracking and debounced update delivery for a live game
//! backend.
//!
//! This crate provides:
//! - A registry ([`DataFront`]) of tables, table queries, singletons, and
//!   actions keyed by resource path
//! - Per-entity, per-client subscription tracking recorded on read
//! - Producer push APIs fanning changes out to exactly the subscribed
//!   clients
//! - A per-client debounced delivery queue emitting one `update` frame per
//!   window
//!
//! # Architecture
//!
//! The host owns the transport. Inbound, its command dispatcher routes each
//! client request to the registry's [`CommandHandler`]; outbound, the
//! delivery queue hands batched frames to the host's [`Comms`]
//! implementation. Between the two, attached resources record which client
//! is subscribed to which entity, query parameter, or singleton, and
//! producer pushes travel only to those clients.
//!
//! ```rust,ignore
//! use datafront_core::{DataFront, FrontConfig, QueryableTable};
//! use datafront_protocol::ResourcePath;
//! use std::sync::Arc;
//!
//! let front = DataFront::new(FrontConfig::new("data"), comms);
//! let bases = Arc::new(QueryableTable::new(move |request, ctx| {
//!     store.load_bases(&request.ids, ctx)
//! }));
//! front.attach_table(ResourcePath::from("bases"), bases.clone())?;
//! front.register(&dispatcher);
//! front.run();
//!
//! // Later, when a base changes:
//! bases.publish_entities(&changed)?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
// Production code MUST NOT use panic!/unwrap()/expect()
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod action;
mod collection;
mod comms;
mod config;
mod context;
mod delivery;
mod dispatch;
mod error;
mod query;
mod registry;
mod resource;
mod singleton;
mod sweep;
mod table;

pub use action::Action;
pub use collection::{EntityCollection, EntityDescriptor, SerdeDescriptor};
pub use comms::{Comms, SessionEvent, SessionEvents};
pub use config::FrontConfig;
pub use context::RequestContext;
pub use delivery::{DeliveryQueue, QueuePhase};
pub use dispatch::{CommandHandler, Dispatcher};
pub use error::{FrontError, FrontResult};
pub use query::TrackableTableQuery;
pub use registry::DataFront;
pub use resource::{ActionResource, FrontBinding, FrontResource, SingletonResource, TableResource};
pub use singleton::QueryableSingleton;
pub use sweep::PeriodicSweep;
pub use table::QueryableTable;
