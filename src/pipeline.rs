//! One poll cycle: discover → synthesize → render → detect change → apply
//!
//! Nothing is retried within a cycle; a failure at any stage ends it and
//! the next scheduled poll starts over from a fresh inventory. Only apply
//! failures additionally notify, since only they leave the proxy holding
//! a config that its own validation rejected.

use crate::apply::{self, ApplyOutcome};
use crate::certs::CertStore;
use crate::cloud::CloudClient;
use crate::config::Settings;
use crate::discovery;
use crate::model::{self, SynthesisError};
use crate::notify::Notifier;
use crate::render;
use thiserror::Error;
use tracing::{error, info};

/// Which stage a failed cycle died in
#[derive(Debug, Error)]
pub enum CycleError {
    #[error("container discovery failed: {0:#}")]
    Discovery(anyhow::Error),
    #[error("model synthesis failed: {0}")]
    Synthesis(SynthesisError),
    #[error("certificate write failed: {0:#}")]
    Certificate(anyhow::Error),
    #[error("config apply failed: {0:#}")]
    Apply(anyhow::Error),
}

/// Run one full discovery-to-apply cycle.
///
/// Returns `Ok(())` both for a no-op cycle and for a cycle that ended in
/// the terminal `Failed` apply state. The latter is already logged and
/// notified here, and the caller's only recourse is the next poll anyway.
pub async fn run_cycle(
    settings: &Settings,
    client: &CloudClient,
    notifier: &Notifier,
) -> Result<(), CycleError> {
    let records = discovery::discover(client, settings)
        .await
        .map_err(CycleError::Discovery)?;

    let certs = CertStore::new(&settings.certs_dir);
    let model = model::synthesize(&records, &certs).map_err(|e| match e {
        SynthesisError::Certificate(inner) => CycleError::Certificate(inner),
        other => CycleError::Synthesis(other),
    })?;

    let rendered = render::render(&model, settings.render_mode, &settings.certs_dir);

    if !apply::config_changed(&settings.config_file, settings.render_mode, &rendered) {
        info!("Proxy config unchanged");
        return Ok(());
    }

    match apply::apply(settings, &rendered)
        .await
        .map_err(CycleError::Apply)?
    {
        ApplyOutcome::Applied => {
            info!(config = %rendered, "Applied new proxy configuration");
        }
        ApplyOutcome::Failed { error: detail } => {
            error!(error = %detail, "Proxy rejected the new configuration");
            notifier.config_failed(&detail, &rendered).await;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_error_names_its_stage() {
        let err = CycleError::Discovery(anyhow::anyhow!("connection refused"));
        assert!(err.to_string().contains("discovery"));

        let err = CycleError::Apply(anyhow::anyhow!("disk full"));
        assert!(err.to_string().contains("apply"));
    }
}
