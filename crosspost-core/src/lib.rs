//! Shared primitives for the crosspost publishing core: the injected
//! [`Clock`]/[`IdGen`] pair every other crate builds on, the cross-cutting
//! error taxonomy, the `Provider` catalog, and process configuration.
//!
//! No component outside this crate is allowed to read the wall clock or
//! mint a random id directly — see `clock` and `id`.

pub mod clock;
pub mod config;
pub mod error;
pub mod id;
pub mod model;
pub mod provider;

pub use clock::Clock;
pub use error::{AppError, ErrorKind};
pub use id::IdGen;
pub use model::{ResultError, TargetResult};
pub use provider::Provider;
