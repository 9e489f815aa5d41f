//! Integration test suite for calcflow.
//!
//! These tests drive expressions from submission to a final value through
//! the coordinator, in-process worker pools and the HTTP transport.
//!
//! # Test Categories
//!
//! - `decomposition`: Task generation and result folding across whole trees
//! - `worker_pool`: Concurrent workers against a shared coordinator
//! - `http_e2e`: Orchestrator API and remote agents over real sockets
//!
//! # CI Compatibility
//!
//! Operation times are zero and the HTTP tests bind ephemeral ports on
//! localhost, so the suite needs no network access.

mod fixtures;

mod http_e2e;
mod worker_pool;
