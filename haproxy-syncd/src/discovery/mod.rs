pub mod cloudmap;

use std::future::Future;
use anyhow::Result;
use shared::types::{Instance, Namespace, Service};

/// Read side of the discovery registry. Every call is idempotent and returns
/// the complete, unsorted listing in registry order.
pub trait Discovery {
    fn list_namespaces(&self) -> impl Future<Output = Result<Vec<Namespace>>> + Send;

    fn list_services(&self, namespace_id: &str) -> impl Future<Output = Result<Vec<Service>>> + Send;

    fn list_instances(&self, service_id: &str) -> impl Future<Output = Result<Vec<Instance>>> + Send;
}
