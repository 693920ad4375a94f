//! # DataFront Protocol
//!
//! Wire types shared between the DataFront sync core and its host transports.
//!
//! This crate provides:
//! - Resource paths and opaque identifiers (sessions, users, entity keys)
//! - Inbound request envelopes and the closed discriminator set
//! - Response bodies returned to the dispatcher
//! - The batched `update` frame pushed to subscribed clients
//!
//! Pure data crate: no I/O, no locking, no runtime. All envelopes serialize
//! with `serde` in camelCase to match the client SDKs.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod ids;
mod path;
mod request;
mod response;
mod update;

pub use ids::{ClientId, EntityKey, UserId};
pub use path::{PathError, ResourcePath};
pub use request::{
    ActionRequest, DispatcherCommand, RequestKind, SingletonRequest, SingletonUnsubscribeRequest,
    TableRequest, TableUnsubscribeRequest,
};
pub use response::{ResponseBody, SingletonResponse, TableResponse};
pub use update::{QueryNotification, SingletonPatch, TablePatch, UpdateFrame};
