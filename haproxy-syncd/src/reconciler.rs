//! One reconciliation cycle: discovery → render → diff → apply.

use anyhow::Result;
use chrono::Utc;
use sha2::{Digest, Sha256};
use tokio::sync::watch;
use shared::types::{AppliedConfig, MappedNamespace};
use crate::actuator::{Actuator, ApplyError};
use crate::config::NamespaceMapping;
use crate::discovery::Discovery;
use crate::health::HealthReporter;
use crate::render::{NamespaceTopology, Renderer, ServiceTopology};

#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error("discovery call failed: {0:#}")]
    Discovery(#[source] anyhow::Error),
    #[error(transparent)]
    Apply(#[from] ApplyError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    Applied,
    Unchanged,
}

/// Startup-only: keep the registry namespaces the operator asked for, in
/// registry order, each paired with its domain.
pub async fn resolve_namespaces<D: Discovery>(
    discovery: &D,
    requested: &[NamespaceMapping],
) -> Result<Vec<MappedNamespace>> {
    tracing::info!("Getting namespaces from discovery registry");
    let candidates = discovery.list_namespaces().await?;

    let mapped: Vec<MappedNamespace> = candidates
        .into_iter()
        .filter_map(|ns| {
            let mapping = requested.iter().find(|m| m.namespace == ns.name)?;
            tracing::info!(namespace = %ns.name, id = %ns.id, domain = %mapping.domainname, "Found namespace");
            Some(MappedNamespace {
                id: ns.id,
                name: ns.name,
                domain: mapping.domainname.clone(),
            })
        })
        .collect();

    for mapping in requested {
        if !mapped.iter().any(|ns| ns.name == mapping.namespace) {
            tracing::warn!(namespace = %mapping.namespace, "Requested namespace not found in registry");
        }
    }

    Ok(mapped)
}

pub struct Reconciler<D, A> {
    discovery: D,
    actuator: A,
    renderer: Renderer,
    namespaces: Vec<MappedNamespace>,
    health: HealthReporter,
    last_applied: Option<String>,
    applied_tx: watch::Sender<Option<AppliedConfig>>,
}

impl<D: Discovery, A: Actuator> Reconciler<D, A> {
    pub fn new(
        discovery: D,
        actuator: A,
        renderer: Renderer,
        namespaces: Vec<MappedNamespace>,
        health: HealthReporter,
        applied_tx: watch::Sender<Option<AppliedConfig>>,
    ) -> Self {
        Self {
            discovery,
            actuator,
            renderer,
            namespaces,
            health,
            last_applied: None,
            applied_tx,
        }
    }

    /// Run one cycle and report its result to the health reporter.
    pub async fn tick(&mut self) -> Result<CycleOutcome, ReconcileError> {
        let result = self.run_cycle().await;
        match &result {
            Ok(CycleOutcome::Applied) => {
                self.health.reset();
            }
            Ok(CycleOutcome::Unchanged) => {}
            Err(e) => {
                let failures = self.health.record_failure();
                tracing::error!(failures, "Reconciliation cycle failed: {}", e);
                if !self.health.is_healthy() {
                    tracing::warn!(failures, "Reporting down to liveness probes");
                }
            }
        }
        result
    }

    pub async fn run_cycle(&mut self) -> Result<CycleOutcome, ReconcileError> {
        tracing::info!("Getting services from discovery registry");
        let topology = self.fetch_topology().await.map_err(ReconcileError::Discovery)?;
        let document = self.renderer.render(&topology);

        if self.last_applied.as_deref() == Some(document.as_str()) {
            tracing::info!("The config has not changed");
            return Ok(CycleOutcome::Unchanged);
        }

        let hash = hex::encode(Sha256::digest(document.as_bytes()));
        tracing::info!(hash = %hash, "The config has changed");

        // remembered before the write; a failed write is not retried until
        // the topology changes
        self.last_applied = Some(document.clone());
        self.actuator.apply(&document).await?;

        self.applied_tx.send_replace(Some(AppliedConfig {
            hash,
            applied_at: Utc::now(),
        }));
        Ok(CycleOutcome::Applied)
    }

    /// Sequential walk, namespace by namespace and service by service; the
    /// first failing call aborts the whole walk.
    async fn fetch_topology(&self) -> Result<Vec<NamespaceTopology>> {
        tracing::info!(count = self.namespaces.len(), "Fetching services for namespaces");
        let mut topology = Vec::with_capacity(self.namespaces.len());

        for namespace in &self.namespaces {
            tracing::debug!(namespace = %namespace.name, id = %namespace.id, "Getting services");
            let services = self.discovery.list_services(&namespace.id).await?;

            let mut entries = Vec::with_capacity(services.len());
            for service in services {
                let instances = self.discovery.list_instances(&service.id).await?;
                tracing::debug!(service = %service.name, instances = instances.len(), "Got instances");
                entries.push(ServiceTopology { service, instances });
            }

            topology.push(NamespaceTopology {
                namespace: namespace.clone(),
                services: entries,
            });
        }

        Ok(topology)
    }
}
