use std::net::Ipv4Addr;
use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};

/// A namespace as listed by the discovery registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Namespace {
    /// Registry-assigned identifier, e.g. "ns-abc123"
    pub id: String,

    /// Display name, e.g. "prod.local"
    pub name: String,
}

/// A requested namespace paired with the domain its services are routed under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappedNamespace {
    pub id: String,
    pub name: String,
    pub domain: String,
}

/// A service registered inside one namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    pub id: String,

    /// Raw registered name, possibly DNS-SD qualified, e.g. "_api._tcp.prod.local"
    pub name: String,

    pub namespace_id: String,
}

/// One network endpoint backing a service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    pub id: String,
    pub service_id: String,
    pub address: Ipv4Addr,
    pub port: u16,
}

/// Fingerprint of the configuration document currently handed to the proxy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedConfig {
    /// Hex SHA-256 of the document
    pub hash: String,

    pub applied_at: DateTime<Utc>,
}
