//! Server side of the proxy.
//!
//! - [`master::Master`]: composition root. Owns the config and the cache
//!   store, binds the listener and runs the accept loop.
//! - [`worker::Dispatcher`]: per-request pipeline
//!   (key -> lookup -> fetch on miss -> store -> respond).

pub mod master;
pub mod worker;

pub use master::{Listening, Master};
pub use worker::{DispatchOutcome, Dispatcher};
