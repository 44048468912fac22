//! Process-wide configuration, loaded once at startup from the environment

use std::path::PathBuf;

/// How the rendered configuration reaches the active config file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderMode {
    /// Render a complete config file and fully overwrite the active one
    Full,
    /// Render only upstream blocks and splice them between the
    /// `#upstreams` / `#upstreams-end` markers of the active file
    Upstreams,
}

impl RenderMode {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "full" => Some(RenderMode::Full),
            "upstreams" => Some(RenderMode::Upstreams),
            _ => None,
        }
    }
}

/// Everything the pipeline needs to know about its environment.
///
/// Constructed once in `main` and passed by reference to each component;
/// no component reads process environment variables on its own.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Logical name of this proxy instance; containers opt in by setting
    /// their `NGINX_LB` variable to this value
    pub lb_name: String,

    /// Base URL of the container inventory API
    pub api_url: String,

    /// Literal `Authorization` header value for the inventory API, if any
    pub api_auth: Option<String>,

    /// Webhook URL for failure notifications (notifications are skipped
    /// when unset)
    pub slack_webhook: Option<String>,

    /// Path of the active proxy config file
    pub config_file: PathBuf,

    /// Directory certificate material is written to
    pub certs_dir: PathBuf,

    /// Page size for container inventory listing
    pub container_limit: u32,

    /// When false, the validate and reload commands are never invoked and
    /// a written config always counts as applied
    pub reload_enabled: bool,

    /// Command line that validates the written config
    pub validate_command: String,

    /// Command line that reloads the proxy process
    pub reload_command: String,

    /// Full-file or marker-splice output
    pub render_mode: RenderMode,

    /// Seconds between poll cycles
    pub poll_interval_secs: u64,
}

impl Settings {
    /// Load settings from process environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(&|key| std::env::var(key).ok())
    }

    /// Load settings through an arbitrary key lookup
    ///
    /// All problems are collected and reported together so a misconfigured
    /// deployment fails with one complete message.
    pub fn from_lookup(get: &dyn Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let mut errors = Vec::new();

        let lb_name = get("NGINX_LB_NAME").unwrap_or_default();
        if lb_name.is_empty() {
            errors.push("NGINX_LB_NAME must be set to this proxy's logical name".to_string());
        }

        let api_url = get("CLOUD_API_URL").unwrap_or_default();
        if api_url.is_empty() {
            errors.push("CLOUD_API_URL must be set to the container API base URL".to_string());
        }

        let container_limit = match get("CONTAINER_LIMIT") {
            None => default_container_limit(),
            Some(raw) => match raw.parse() {
                Ok(n) => n,
                Err(_) => {
                    errors.push(format!("CONTAINER_LIMIT is not a number: '{}'", raw));
                    default_container_limit()
                }
            },
        };

        let poll_interval_secs = match get("POLL_INTERVAL") {
            None => default_poll_interval(),
            Some(raw) => match raw.parse() {
                Ok(n) => n,
                Err(_) => {
                    errors.push(format!("POLL_INTERVAL is not a number: '{}'", raw));
                    default_poll_interval()
                }
            },
        };

        let render_mode = match get("NGINX_RENDER_MODE") {
            None => RenderMode::Full,
            Some(raw) => match RenderMode::parse(&raw) {
                Some(mode) => mode,
                None => {
                    errors.push(format!(
                        "NGINX_RENDER_MODE must be 'full' or 'upstreams', got '{}'",
                        raw
                    ));
                    RenderMode::Full
                }
            },
        };

        if !errors.is_empty() {
            anyhow::bail!("Configuration errors:\n  - {}", errors.join("\n  - "));
        }

        Ok(Self {
            lb_name,
            api_url,
            api_auth: get("CLOUD_API_AUTH"),
            slack_webhook: get("SLACK_WEBHOOK"),
            config_file: get("NGINX_CONFIG_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(default_config_file),
            certs_dir: get("NGINX_CERTS")
                .map(PathBuf::from)
                .unwrap_or_else(default_certs_dir),
            container_limit,
            reload_enabled: get("NGINX_RELOAD").as_deref() != Some("false"),
            validate_command: get("NGINX_VALIDATE_CMD").unwrap_or_else(default_validate_command),
            reload_command: get("NGINX_RELOAD_CMD").unwrap_or_else(default_reload_command),
            render_mode,
            poll_interval_secs,
        })
    }
}

// Default value functions
fn default_config_file() -> PathBuf {
    PathBuf::from("/etc/nginx/conf.d/default.conf")
}

fn default_certs_dir() -> PathBuf {
    PathBuf::from("/certs")
}

fn default_container_limit() -> u32 {
    25
}

fn default_poll_interval() -> u64 {
    30
}

fn default_validate_command() -> String {
    "nginx -t".to_string()
}

fn default_reload_command() -> String {
    "service nginx reload".to_string()
}
