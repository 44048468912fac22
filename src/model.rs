//! Folds filtered container records into the render-ready proxy model
//!
//! One synthesis pass turns an ordered container sequence into named
//! upstream pools and virtual-host entries. Pools are deduplicated by
//! name, hosts by hostname, with all merging done through keyed indices
//! so a hostname or pool can never appear twice in the output. Everything
//! here is rebuilt from scratch each poll cycle.

use crate::certs::CertStore;
use crate::cloud::{
    ContainerRecord, MissingEnvVar, ENV_CERT, ENV_LOCATION, ENV_PORT, ENV_SERVER_NAME,
    ENV_SERVICE_HOSTNAME, ENV_VIRTUAL_HOST,
};
use std::collections::HashMap;
use thiserror::Error;
use tracing::{debug, info};

pub const DEFAULT_BACKEND_PORT: u16 = 80;
pub const DEFAULT_LOCATION: &str = "/";

/// A named group of backend endpoints the proxy balances across.
/// Endpoint order is container enumeration order; it carries no weighting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamPool {
    pub name: String,
    pub servers: Vec<String>,
}

/// One path-routing entry: requests matching `path` proxy to `upstream`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub path: String,
    pub upstream: String,
}

/// A server definition keyed by hostname.
///
/// Plaintext hosts carry `locations`. The plaintext twin of a TLS host
/// carries `redirects` instead: the paths that answer with an HTTPS
/// redirect rather than proxying.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualHost {
    pub server_name: String,
    pub locations: Vec<Location>,
    pub redirects: Vec<String>,
}

/// The complete synthesized configuration model for one poll cycle
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProxyModel {
    pub upstreams: Vec<UpstreamPool>,
    pub plain_servers: Vec<VirtualHost>,
    pub ssl_servers: Vec<VirtualHost>,
}

/// Why a synthesis pass failed; any variant aborts the cycle
#[derive(Debug, Error)]
pub enum SynthesisError {
    #[error("container {uuid}: {source}")]
    MissingVariable {
        uuid: String,
        #[source]
        source: MissingEnvVar,
    },
    #[error("container {uuid}: invalid {key} value '{value}'")]
    InvalidValue {
        uuid: String,
        key: &'static str,
        value: String,
    },
    #[error("certificate write failed: {0:#}")]
    Certificate(anyhow::Error),
}

/// Accumulates pools and host entries with O(1) name-keyed merging while
/// preserving first-seen order.
#[derive(Debug, Default)]
struct ModelBuilder {
    pools: Vec<UpstreamPool>,
    pool_index: HashMap<String, usize>,
    hosts: Vec<HostEntry>,
    host_index: HashMap<String, usize>,
}

#[derive(Debug)]
struct HostEntry {
    server_name: String,
    tls: bool,
    locations: Vec<Location>,
}

impl ModelBuilder {
    fn pool_mut(&mut self, name: &str) -> &mut UpstreamPool {
        let index = match self.pool_index.get(name) {
            Some(&index) => index,
            None => {
                self.pools.push(UpstreamPool {
                    name: name.to_string(),
                    servers: Vec::new(),
                });
                let index = self.pools.len() - 1;
                self.pool_index.insert(name.to_string(), index);
                index
            }
        };
        &mut self.pools[index]
    }

    fn host_mut(&mut self, server_name: &str) -> &mut HostEntry {
        let index = match self.host_index.get(server_name) {
            Some(&index) => index,
            None => {
                self.hosts.push(HostEntry {
                    server_name: server_name.to_string(),
                    tls: false,
                    locations: Vec::new(),
                });
                let index = self.hosts.len() - 1;
                self.host_index.insert(server_name.to_string(), index);
                index
            }
        };
        &mut self.hosts[index]
    }

    fn finish(self) -> ProxyModel {
        let mut plain_servers = Vec::new();
        let mut ssl_servers = Vec::new();

        for host in self.hosts {
            if host.tls {
                // The plaintext twin of a TLS host only redirects
                plain_servers.push(VirtualHost {
                    server_name: host.server_name.clone(),
                    locations: Vec::new(),
                    redirects: host.locations.iter().map(|l| l.path.clone()).collect(),
                });
                ssl_servers.push(VirtualHost {
                    server_name: host.server_name,
                    locations: host.locations,
                    redirects: Vec::new(),
                });
            } else {
                plain_servers.push(VirtualHost {
                    server_name: host.server_name,
                    locations: host.locations,
                    redirects: Vec::new(),
                });
            }
        }

        ProxyModel {
            upstreams: self.pools,
            plain_servers,
            ssl_servers,
        }
    }
}

impl HostEntry {
    /// Merge a location, keeping the first contributor for a given path
    fn add_location(&mut self, path: &str, upstream: &str) {
        if self.locations.iter().any(|l| l.path == path) {
            return;
        }
        self.locations.push(Location {
            path: path.to_string(),
            upstream: upstream.to_string(),
        });
    }
}

/// Fold container records into the proxy model, materializing certificate
/// payloads as they are encountered.
///
/// Records are processed in input order. Each contributes one endpoint to
/// the pool named after its (normalized) service hostname, and optionally
/// location or redirect entries for each declared virtual hostname. A
/// container without hostnames only feeds its pool.
pub fn synthesize(
    records: &[ContainerRecord],
    certs: &CertStore,
) -> Result<ProxyModel, SynthesisError> {
    let mut builder = ModelBuilder::default();

    for record in records {
        let env = record.env();

        let service_host =
            env.required(ENV_SERVICE_HOSTNAME)
                .map_err(|source| SynthesisError::MissingVariable {
                    uuid: record.uuid.clone(),
                    source,
                })?;
        let pool_name = snake_case(service_host);

        let port = match env.get(ENV_PORT) {
            None => DEFAULT_BACKEND_PORT,
            Some(raw) => raw.parse().map_err(|_| SynthesisError::InvalidValue {
                uuid: record.uuid.clone(),
                key: ENV_PORT,
                value: raw.to_string(),
            })?,
        };

        builder
            .pool_mut(&pool_name)
            .servers
            .push(format!("{}:{}", record.private_ip, port));

        let hostnames = declared_hostnames(env.get(ENV_VIRTUAL_HOST), env.get(ENV_SERVER_NAME));
        if hostnames.is_empty() {
            // Upstream-only container
            debug!(uuid = %record.uuid, pool = %pool_name, "Container declares no virtual host");
            continue;
        }

        let cert_payloads: Vec<&str> = env
            .get(ENV_CERT)
            .map(|raw| raw.split(',').collect())
            .unwrap_or_default();

        let path = env
            .get(ENV_LOCATION)
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .unwrap_or(DEFAULT_LOCATION);

        for (position, hostname) in hostnames.iter().enumerate() {
            // TLS applies only when non-empty certificate content was
            // supplied; the write happens before the host can be rendered
            let material = cert_payloads
                .get(position)
                .copied()
                .filter(|m| !m.trim().is_empty());
            if let Some(material) = material {
                certs
                    .write(hostname, material)
                    .map_err(SynthesisError::Certificate)?;
            }

            let host = builder.host_mut(hostname);
            host.tls |= material.is_some();
            host.add_location(path, &pool_name);
        }
    }

    let model = builder.finish();
    info!(
        pools = model.upstreams.len(),
        plain_hosts = model.plain_servers.len(),
        ssl_hosts = model.ssl_servers.len(),
        "Model synthesized"
    );

    Ok(model)
}

/// Hostnames a container declares: the comma-separated virtual-host list,
/// or the explicit server name when no list is given.
fn declared_hostnames<'a>(
    virtual_hosts: Option<&'a str>,
    server_name: Option<&'a str>,
) -> Vec<&'a str> {
    match virtual_hosts {
        Some(list) => list
            .split(',')
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .collect(),
        None => server_name
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .into_iter()
            .collect(),
    }
}

/// Normalize a service hostname into a safe upstream identifier:
/// lowercase words joined by underscores, word boundaries at
/// non-alphanumeric characters and lower-to-upper case changes.
pub fn snake_case(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut prev_lower_or_digit = false;
    let mut separator_pending = false;

    for ch in input.chars() {
        if ch.is_ascii_alphanumeric() {
            let boundary = separator_pending || (ch.is_ascii_uppercase() && prev_lower_or_digit);
            if boundary && !out.is_empty() {
                out.push('_');
            }
            out.push(ch.to_ascii_lowercase());
            prev_lower_or_digit = ch.is_ascii_lowercase() || ch.is_ascii_digit();
            separator_pending = false;
        } else {
            separator_pending = true;
            prev_lower_or_digit = false;
        }
    }

    out
}
