//! Integration and end-to-end tests for twfs.
//!
//! This crate provides:
//! - An in-memory remote service with call accounting and fault injection
//! - A mount harness driving the dispatcher the way the FUSE bridge does
//! - A scripted HTTP transport for exercising the REST client end to end

pub mod harness;
pub mod mock;
pub mod scripted;

pub use harness::TestMount;
pub use mock::{MockApi, Op};
pub use scripted::ScriptedTransport;
