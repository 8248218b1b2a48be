//! Mock Kubernetes API server for testing.
//!
//! Serves read-only `GET` requests over HTTP, so it can be reached through a
//! regular kubeconfig-based connection.

pub mod catalog;
mod helpers;
pub mod http;

pub use catalog::MockApiResource;
pub use http::{HttpMockK8sServer, RunningHttpMockK8sServer};
