//! Bastion Core — domain models, repository traits and shared error
//! types for the multi-tenant authentication pipeline.
//!
//! Nothing in this crate talks to a database. Storage backends
//! implement the traits in [`repository`] and are bundled behind
//! [`repository::Store`].

pub mod context;
pub mod error;
pub mod models;
pub mod repository;

pub use context::RequestContext;
pub use error::{CoreError, CoreResult};
