use std::time::Duration;
use tokio_util::sync::CancellationToken;
use crate::actuator::Actuator;
use crate::discovery::Discovery;
use crate::reconciler::Reconciler;

/// Drive the reconciler forever with a fixed delay between cycles.
///
/// The delay starts only after a cycle finished, so cycles never overlap.
/// Failures are already recorded by the reconciler; the loop just carries on.
/// Cancellation is observed between cycles, never inside one.
pub async fn run<D: Discovery, A: Actuator>(
    mut reconciler: Reconciler<D, A>,
    interval: Duration,
    cancel: CancellationToken,
) {
    tracing::info!(interval_secs = interval.as_secs(), "Starting reconciliation loop");

    loop {
        // outcome already logged and counted by tick()
        let _ = reconciler.tick().await;

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = cancel.cancelled() => {
                tracing::info!("Reconciliation loop shutting down");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use anyhow::{anyhow, Result};
    use tokio::sync::watch;
    use shared::types::{Instance, MappedNamespace, Namespace, Service};
    use crate::actuator::ApplyError;
    use crate::health::HealthReporter;
    use crate::render::{Renderer, Secrets};

    /// Every services call fails and counts itself.
    #[derive(Clone, Default)]
    struct DownRegistry {
        calls: Arc<AtomicUsize>,
    }

    impl Discovery for DownRegistry {
        async fn list_namespaces(&self) -> Result<Vec<Namespace>> {
            Ok(Vec::new())
        }

        async fn list_services(&self, _namespace_id: &str) -> Result<Vec<Service>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(anyhow!("connection refused"))
        }

        async fn list_instances(&self, _service_id: &str) -> Result<Vec<Instance>> {
            Ok(Vec::new())
        }
    }

    struct NoopActuator;

    impl Actuator for NoopActuator {
        async fn apply(&self, _document: &str) -> Result<(), ApplyError> {
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_keeps_running_through_failures() {
        let registry = DownRegistry::default();
        let health = HealthReporter::new();
        let (tx, _rx) = watch::channel(None);
        let namespaces = vec![MappedNamespace {
            id: "ns-1".to_string(),
            name: "prod".to_string(),
            domain: "example.com".to_string(),
        }];
        let reconciler = Reconciler::new(
            registry.clone(),
            NoopActuator,
            Renderer::new(Secrets::new("stats", "metrics").unwrap(), "www.example.com"),
            namespaces,
            health.clone(),
            tx,
        );

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run(reconciler, Duration::from_secs(60), cancel.clone()));

        // first cycle runs immediately, then one per interval
        tokio::time::sleep(Duration::from_secs(150)).await;
        cancel.cancel();
        handle.await.unwrap();

        assert_eq!(registry.calls.load(Ordering::SeqCst), 3);
        assert_eq!(health.num_failures(), 3);
        assert!(!health.is_healthy());
    }
}
