//! Client and record types for the cloud container inventory API

use anyhow::{Context, Result};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// The only container state eligible for load balancing
pub const RUNNING_STATE: &str = "Running";

// Recognized per-container environment keys
/// Selector: must equal this proxy instance's logical name
pub const ENV_LB: &str = "NGINX_LB";
/// Service hostname the upstream pool name is derived from (required)
pub const ENV_SERVICE_HOSTNAME: &str = "DOCKERCLOUD_SERVICE_HOSTNAME";
/// Backend port, defaults to 80
pub const ENV_PORT: &str = "NGINX_PORT";
/// Comma-separated virtual hostnames served by this container
pub const ENV_VIRTUAL_HOST: &str = "NGINX_VIRTUAL_HOST";
/// Comma-separated certificate payloads, positionally paired with the
/// virtual hostnames, with newlines escaped as `\n`
pub const ENV_CERT: &str = "NGINX_CERT";
/// Location path pattern, defaults to `/`
pub const ENV_LOCATION: &str = "NGINX_LOCATION";
/// Explicit server name, used when no virtual hostnames are declared
pub const ENV_SERVER_NAME: &str = "NGINX_SERVER_NAME";

/// One key/value environment entry of a container; keys are not unique
#[derive(Debug, Clone, Deserialize)]
pub struct EnvPair {
    pub key: String,
    pub value: String,
}

/// Inventory list item; carries the locator of the full record
#[derive(Debug, Clone, Deserialize)]
pub struct ContainerSummary {
    pub resource_uri: String,
}

#[derive(Debug, Deserialize)]
struct ContainerPage {
    objects: Vec<ContainerSummary>,
}

/// Full container record as returned by the detail endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct ContainerRecord {
    pub uuid: String,
    pub state: String,
    pub private_ip: String,
    #[serde(default)]
    pub container_envvars: Vec<EnvPair>,
}

impl ContainerRecord {
    pub fn is_running(&self) -> bool {
        self.state == RUNNING_STATE
    }

    /// Typed lookup view over this record's environment entries
    pub fn env(&self) -> ContainerEnv<'_> {
        ContainerEnv {
            pairs: &self.container_envvars,
        }
    }
}

/// A required environment key was absent from a container record
#[derive(Debug, Error)]
#[error("missing required environment variable '{0}'")]
pub struct MissingEnvVar(pub &'static str);

/// First-match-by-key lookup over a container's environment entries.
///
/// Keys are not guaranteed unique in the API response; the first entry for
/// a key wins, matching the inventory service's own resolution order.
#[derive(Debug, Clone, Copy)]
pub struct ContainerEnv<'a> {
    pairs: &'a [EnvPair],
}

impl<'a> ContainerEnv<'a> {
    /// Optional variable: first value for `key`, if any
    pub fn get(&self, key: &str) -> Option<&'a str> {
        self.pairs
            .iter()
            .find(|pair| pair.key == key)
            .map(|pair| pair.value.as_str())
    }

    /// Required variable: first value for `key`, or an error naming it
    pub fn required(&self, key: &'static str) -> Result<&'a str, MissingEnvVar> {
        self.get(key).ok_or(MissingEnvVar(key))
    }
}

/// Client for the container inventory API
pub struct CloudClient {
    http: reqwest::Client,
    base_url: String,
    auth: Option<String>,
}

impl CloudClient {
    pub fn new(base_url: &str, auth: Option<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            auth,
        })
    }

    /// List up to `limit` container summaries
    pub async fn list(&self, limit: u32) -> Result<Vec<ContainerSummary>> {
        let url = format!("{}/api/app/v1/container/?limit={}", self.base_url, limit);
        let page: ContainerPage = self
            .request(&url)
            .await
            .with_context(|| format!("Failed to list containers from {}", url))?;

        debug!(count = page.objects.len(), "Listed containers");
        Ok(page.objects)
    }

    /// Fetch the full record behind a summary's resource locator
    pub async fn detail(&self, resource_uri: &str) -> Result<ContainerRecord> {
        let url = format!("{}{}", self.base_url, resource_uri);
        self.request(&url)
            .await
            .with_context(|| format!("Failed to fetch container detail from {}", url))
    }

    async fn request<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T> {
        let mut request = self.http.get(url);
        if let Some(ref auth) = self.auth {
            request = request.header(reqwest::header::AUTHORIZATION, auth.as_str());
        }

        let response = request.send().await?.error_for_status()?;
        Ok(response.json().await?)
    }
}
