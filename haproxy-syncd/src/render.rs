//! HAProxy configuration document assembly.
//!
//! The document is built by appending immutable sections in a fixed order:
//! global and defaults, the metrics userlist, the `main` frontend with one
//! host rule per service, one backend per service, and the catch-all backend.
//! Nothing is sorted; services and instances appear in the order discovery
//! returned them, so an unchanged topology renders byte-identical text.

use anyhow::{anyhow, Result};
use sha_crypt::{sha512_simple, Sha512Params, ROUNDS_DEFAULT};
use shared::protocol::DEFAULT_BACKEND;
use shared::types::{Instance, MappedNamespace, Service};
use crate::normalize::normalize;

const METRICS_USERLIST: &str = "metrics_users";
const METRICS_USER: &str = "metrics";
const STATS_USER: &str = "stats_user";

/// One namespace with its services, in discovery order.
#[derive(Debug, Clone)]
pub struct NamespaceTopology {
    pub namespace: MappedNamespace,
    pub services: Vec<ServiceTopology>,
}

#[derive(Debug, Clone)]
pub struct ServiceTopology {
    pub service: Service,
    pub instances: Vec<Instance>,
}

/// Operator credentials embedded in the document.
#[derive(Clone)]
pub struct Secrets {
    stats_password: String,
    metrics_password_hash: String,
}

impl Secrets {
    /// Hashes the metrics password once (SHA-512 crypt with a random salt).
    pub fn new(stats_password: impl Into<String>, metrics_password: &str) -> Result<Self> {
        let params = Sha512Params::new(ROUNDS_DEFAULT)
            .map_err(|e| anyhow!("Invalid SHA-512 crypt parameters: {:?}", e))?;
        let metrics_password_hash = sha512_simple(metrics_password, &params)
            .map_err(|e| anyhow!("Failed to hash metrics password: {:?}", e))?;

        Ok(Self {
            stats_password: stats_password.into(),
            metrics_password_hash,
        })
    }

    #[cfg(test)]
    fn with_hash(stats_password: &str, metrics_password_hash: &str) -> Self {
        Self {
            stats_password: stats_password.to_string(),
            metrics_password_hash: metrics_password_hash.to_string(),
        }
    }
}

impl std::fmt::Debug for Secrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Secrets").finish_non_exhaustive()
    }
}

pub struct Renderer {
    secrets: Secrets,
    default_domain: String,
}

impl Renderer {
    pub fn new(secrets: Secrets, default_domain: impl Into<String>) -> Self {
        Self {
            secrets,
            default_domain: default_domain.into(),
        }
    }

    pub fn render(&self, topology: &[NamespaceTopology]) -> String {
        let mut rules = DocumentBuilder::default();
        let mut backends = DocumentBuilder::default();

        for ns in topology {
            for svc in &ns.services {
                // services without endpoints are left out entirely
                if svc.instances.is_empty() {
                    continue;
                }
                let name = normalize(&svc.service.name);
                rules.push(host_rule(&name, &ns.namespace.domain));
                backends.push(backend_section(&name, &svc.instances));
            }
        }

        let mut doc = DocumentBuilder::default();
        doc.push(GLOBAL_SECTION.to_string());
        doc.push(defaults_section(&self.secrets.stats_password));
        doc.push(userlist_section(&self.secrets.metrics_password_hash));
        doc.push(frontend_section());
        doc.append(rules);
        doc.append(backends);
        doc.push(default_backend_section(&self.default_domain));
        doc.finish()
    }
}

/// Ordered list of sections concatenated verbatim.
#[derive(Default)]
struct DocumentBuilder {
    sections: Vec<String>,
}

impl DocumentBuilder {
    fn push(&mut self, section: String) {
        self.sections.push(section);
    }

    fn append(&mut self, other: DocumentBuilder) {
        self.sections.extend(other.sections);
    }

    fn finish(self) -> String {
        self.sections.concat()
    }
}

const GLOBAL_SECTION: &str = "
global
\tlog stdout  format raw  local0  info
";

fn frontend_section() -> String {
    format!(
        "
frontend main
\tbind *:80
\tdefault_backend {DEFAULT_BACKEND}
\tacl metrics_path path /metrics
\tacl metrics_auth http_auth({METRICS_USERLIST})
\thttp-request auth realm metrics if metrics_path !metrics_auth
\thttp-request use-service prometheus-exporter if metrics_path
"
    )
}

fn defaults_section(stats_password: &str) -> String {
    format!(
        "
defaults
\tlog     global
\tmode    http
\tretries 3
\toption redispatch
\toption httplog
\ttimeout connect  5000
\ttimeout client  10000
\ttimeout server  10000
\tstats enable
\tstats uri     /myhaproxy?stats
\tstats auth {STATS_USER}:{stats_password}
"
    )
}

fn userlist_section(password_hash: &str) -> String {
    format!(
        "
userlist {METRICS_USERLIST}
\tuser {METRICS_USER} password {password_hash}
"
    )
}

fn host_rule(name: &str, domain: &str) -> String {
    format!(
        "
\tacl {name}_host hdr_dom(host) -i {name}.{domain}
\tuse_backend {name}_backend if {name}_host
"
    )
}

fn backend_section(name: &str, instances: &[Instance]) -> String {
    let mut section = format!(
        "
backend {name}_backend
\tmode http
\tbalance roundrobin
\toption httpclose
\toption forwardfor"
    );
    for (i, instance) in instances.iter().enumerate() {
        section.push_str(&format!(
            "\n\tserver s{i} {}:{} weight 1 check",
            instance.address, instance.port
        ));
    }
    section.push('\n');
    section
}

fn default_backend_section(default_domain: &str) -> String {
    format!(
        "
backend {DEFAULT_BACKEND}
\tredirect location http://{default_domain}
"
    )
}
