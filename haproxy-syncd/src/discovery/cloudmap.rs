use std::future::Future;
use std::net::Ipv4Addr;
use std::time::Duration;
use anyhow::{Context, Result};
use aws_sdk_servicediscovery::config::Region;
use aws_sdk_servicediscovery::operation::list_instances::ListInstancesOutput;
use aws_sdk_servicediscovery::operation::list_namespaces::ListNamespacesOutput;
use aws_sdk_servicediscovery::operation::list_services::ListServicesOutput;
use aws_sdk_servicediscovery::types::{
    FilterCondition, InstanceSummary, NamespaceSummary, ServiceFilter, ServiceFilterName,
    ServiceSummary,
};
use aws_sdk_servicediscovery::Client;
use shared::protocol::{ATTR_INSTANCE_IPV4, ATTR_INSTANCE_PORT, REGISTRY_PAGE_SIZE};
use shared::types::{Instance, Namespace, Service};
use super::Discovery;

/// AWS Cloud Map backed registry client
#[derive(Clone)]
pub struct CloudMapDiscovery {
    client: Client,
    call_timeout: Option<Duration>,
}

impl CloudMapDiscovery {
    pub async fn connect(
        region: &str,
        endpoint: Option<&str>,
        call_timeout: Option<Duration>,
    ) -> Self {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(Region::new(region.to_string()));
        if let Some(endpoint) = endpoint {
            loader = loader.endpoint_url(endpoint);
        }
        let sdk_config = loader.load().await;

        tracing::info!(region, endpoint, "Cloud Map client configured");

        Self::from_client(Client::new(&sdk_config), call_timeout)
    }

    pub fn from_client(client: Client, call_timeout: Option<Duration>) -> Self {
        Self {
            client,
            call_timeout,
        }
    }

    async fn bounded<T>(&self, what: &str, call: impl Future<Output = Result<T>>) -> Result<T> {
        match self.call_timeout {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .with_context(|| format!("{} timed out after {:?}", what, limit))?,
            None => call.await,
        }
    }
}

impl Discovery for CloudMapDiscovery {
    async fn list_namespaces(&self) -> Result<Vec<Namespace>> {
        let call = async {
            let summaries: Vec<NamespaceSummary> = self
                .client
                .list_namespaces()
                .max_results(REGISTRY_PAGE_SIZE)
                .into_paginator()
                .send()
                .try_collect()
                .await
                .map(|pages: Vec<ListNamespacesOutput>| {
                    pages
                        .into_iter()
                        .flat_map(|page| page.namespaces.unwrap_or_default())
                        .collect()
                })
                .context("Failed to list namespaces")?;
            Ok(summaries.iter().filter_map(convert_namespace).collect())
        };
        self.bounded("list namespaces", call).await
    }

    async fn list_services(&self, namespace_id: &str) -> Result<Vec<Service>> {
        let call = async {
            let filter = ServiceFilter::builder()
                .name(ServiceFilterName::NamespaceId)
                .values(namespace_id)
                .condition(FilterCondition::Eq)
                .build()
                .context("Failed to build namespace filter")?;

            let summaries: Vec<ServiceSummary> = self
                .client
                .list_services()
                .filters(filter)
                .max_results(REGISTRY_PAGE_SIZE)
                .into_paginator()
                .send()
                .try_collect()
                .await
                .map(|pages: Vec<ListServicesOutput>| {
                    pages
                        .into_iter()
                        .flat_map(|page| page.services.unwrap_or_default())
                        .collect()
                })
                .with_context(|| format!("Failed to list services in namespace {}", namespace_id))?;
            Ok(summaries
                .iter()
                .filter_map(|s| convert_service(s, namespace_id))
                .collect())
        };
        self.bounded("list services", call).await
    }

    async fn list_instances(&self, service_id: &str) -> Result<Vec<Instance>> {
        let call = async {
            let summaries: Vec<InstanceSummary> = self
                .client
                .list_instances()
                .service_id(service_id)
                .max_results(REGISTRY_PAGE_SIZE)
                .into_paginator()
                .send()
                .try_collect()
                .await
                .map(|pages: Vec<ListInstancesOutput>| {
                    pages
                        .into_iter()
                        .flat_map(|page| page.instances.unwrap_or_default())
                        .collect()
                })
                .with_context(|| format!("Failed to list instances of service {}", service_id))?;
            Ok(summaries
                .iter()
                .filter_map(|s| convert_instance(s, service_id))
                .collect())
        };
        self.bounded("list instances", call).await
    }
}

fn convert_namespace(summary: &NamespaceSummary) -> Option<Namespace> {
    match (summary.id(), summary.name()) {
        (Some(id), Some(name)) => Some(Namespace {
            id: id.to_string(),
            name: name.to_string(),
        }),
        _ => {
            tracing::warn!(?summary, "Skipping namespace without id or name");
            None
        }
    }
}

fn convert_service(summary: &ServiceSummary, namespace_id: &str) -> Option<Service> {
    match (summary.id(), summary.name()) {
        (Some(id), Some(name)) => Some(Service {
            id: id.to_string(),
            name: name.to_string(),
            namespace_id: namespace_id.to_string(),
        }),
        _ => {
            tracing::warn!(?summary, "Skipping service without id or name");
            None
        }
    }
}

/// Registry records missing a usable address or port are skipped; the
/// registry is expected to always provide both.
fn convert_instance(summary: &InstanceSummary, service_id: &str) -> Option<Instance> {
    let id = summary.id().unwrap_or_default();
    let attr = |key: &str| summary.attributes().and_then(|a| a.get(key));

    let address = attr(ATTR_INSTANCE_IPV4).and_then(|v| v.parse::<Ipv4Addr>().ok());
    let port = attr(ATTR_INSTANCE_PORT).and_then(|v| v.parse::<u16>().ok());

    match (address, port) {
        (Some(address), Some(port)) => Some(Instance {
            id: id.to_string(),
            service_id: service_id.to_string(),
            address,
            port,
        }),
        _ => {
            tracing::warn!(
                instance = id,
                service = service_id,
                "Skipping instance without a valid {} / {}",
                ATTR_INSTANCE_IPV4,
                ATTR_INSTANCE_PORT
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instance_attributes_are_parsed() {
        let summary = InstanceSummary::builder()
            .id("i-1")
            .attributes(ATTR_INSTANCE_IPV4, "10.0.0.5")
            .attributes(ATTR_INSTANCE_PORT, "8080")
            .build();

        let instance = convert_instance(&summary, "srv-1").unwrap();
        assert_eq!(instance.address, Ipv4Addr::new(10, 0, 0, 5));
        assert_eq!(instance.port, 8080);
        assert_eq!(instance.service_id, "srv-1");
    }

    #[test]
    fn test_instance_without_port_is_skipped() {
        let summary = InstanceSummary::builder()
            .id("i-1")
            .attributes(ATTR_INSTANCE_IPV4, "10.0.0.5")
            .build();

        assert!(convert_instance(&summary, "srv-1").is_none());

        let summary = InstanceSummary::builder()
            .id("i-2")
            .attributes(ATTR_INSTANCE_IPV4, "not-an-ip")
            .attributes(ATTR_INSTANCE_PORT, "8080")
            .build();

        assert!(convert_instance(&summary, "srv-1").is_none());
    }

    #[test]
    fn test_service_keeps_raw_name_and_namespace() {
        let summary = ServiceSummary::builder()
            .id("srv-1")
            .name("_api._tcp.prod.local")
            .build();

        let service = convert_service(&summary, "ns-1").unwrap();
        assert_eq!(service.name, "_api._tcp.prod.local");
        assert_eq!(service.namespace_id, "ns-1");

        let nameless = ServiceSummary::builder().id("srv-2").build();
        assert!(convert_service(&nameless, "ns-1").is_none());
    }

    #[test]
    fn test_namespace_summary_conversion() {
        let summary = NamespaceSummary::builder().id("ns-1").name("prod").build();

        assert_eq!(
            convert_namespace(&summary),
            Some(Namespace {
                id: "ns-1".to_string(),
                name: "prod".to_string(),
            })
        );
    }

    mod paging {
        use super::*;
        use aws_smithy_mocks::{mock, mock_client, RuleMode};

        fn instance_summary(id: &str, ip: &str, port: &str) -> InstanceSummary {
            InstanceSummary::builder()
                .id(id)
                .attributes(ATTR_INSTANCE_IPV4, ip)
                .attributes(ATTR_INSTANCE_PORT, port)
                .build()
        }

        #[tokio::test]
        async fn test_namespaces_are_collected_across_pages() {
            let first = mock!(Client::list_namespaces)
                .match_requests(|req| req.next_token().is_none() && req.max_results() == Some(REGISTRY_PAGE_SIZE))
                .then_output(|| {
                    ListNamespacesOutput::builder()
                        .namespaces(NamespaceSummary::builder().id("ns-1").name("staging").build())
                        .namespaces(NamespaceSummary::builder().id("ns-2").name("prod").build())
                        .next_token("page-2")
                        .build()
                });
            let second = mock!(Client::list_namespaces)
                .match_requests(|req| req.next_token() == Some("page-2"))
                .then_output(|| {
                    ListNamespacesOutput::builder()
                        .namespaces(NamespaceSummary::builder().id("ns-3").name("dev").build())
                        .build()
                });
            let client = mock_client!(aws_sdk_servicediscovery, RuleMode::Sequential, [&first, &second]);

            let discovery = CloudMapDiscovery::from_client(client, None);
            let names: Vec<String> = discovery
                .list_namespaces()
                .await
                .unwrap()
                .into_iter()
                .map(|ns| ns.name)
                .collect();

            assert_eq!(names, vec!["staging", "prod", "dev"]);
            assert_eq!(first.num_calls(), 1);
            assert_eq!(second.num_calls(), 1);
        }

        #[tokio::test]
        async fn test_services_are_filtered_by_namespace_across_pages() {
            let filtered = |req: &aws_sdk_servicediscovery::operation::list_services::ListServicesInput| {
                let filters = format!("{:?}", req.filters());
                filters.contains("NamespaceId") && filters.contains("ns-prod") && filters.contains("Eq")
            };
            let first = mock!(Client::list_services)
                .match_requests(move |req| filtered(req) && req.next_token().is_none())
                .then_output(|| {
                    ListServicesOutput::builder()
                        .services(ServiceSummary::builder().id("srv-1").name("_api._tcp.prod.local").build())
                        .next_token("page-2")
                        .build()
                });
            let second = mock!(Client::list_services)
                .match_requests(move |req| filtered(req) && req.next_token() == Some("page-2"))
                .then_output(|| {
                    ListServicesOutput::builder()
                        .services(ServiceSummary::builder().id("srv-2").name("billing").build())
                        .build()
                });
            let client = mock_client!(aws_sdk_servicediscovery, RuleMode::Sequential, [&first, &second]);

            let discovery = CloudMapDiscovery::from_client(client, None);
            let services = discovery.list_services("ns-prod").await.unwrap();

            let ids: Vec<&str> = services.iter().map(|s| s.id.as_str()).collect();
            assert_eq!(ids, vec!["srv-1", "srv-2"]);
            assert!(services.iter().all(|s| s.namespace_id == "ns-prod"));
            assert_eq!(second.num_calls(), 1);
        }

        #[tokio::test]
        async fn test_instances_are_collected_in_order_across_pages() {
            let first = mock!(Client::list_instances)
                .match_requests(|req| req.service_id() == Some("srv-1") && req.next_token().is_none())
                .then_output(|| {
                    ListInstancesOutput::builder()
                        .instances(instance_summary("i-1", "10.0.0.5", "8080"))
                        .instances(instance_summary("i-bad", "10.0.0.6", "not-a-port"))
                        .next_token("page-2")
                        .build()
                });
            let second = mock!(Client::list_instances)
                .match_requests(|req| req.service_id() == Some("srv-1") && req.next_token() == Some("page-2"))
                .then_output(|| {
                    ListInstancesOutput::builder()
                        .instances(instance_summary("i-2", "10.0.0.7", "8081"))
                        .build()
                });
            let client = mock_client!(aws_sdk_servicediscovery, RuleMode::Sequential, [&first, &second]);

            let discovery = CloudMapDiscovery::from_client(client, None);
            let instances = discovery.list_instances("srv-1").await.unwrap();

            let endpoints: Vec<(Ipv4Addr, u16)> = instances.iter().map(|i| (i.address, i.port)).collect();
            assert_eq!(
                endpoints,
                vec![(Ipv4Addr::new(10, 0, 0, 5), 8080), (Ipv4Addr::new(10, 0, 0, 7), 8081)]
            );
        }
    }
}
