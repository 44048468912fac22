use std::time::Duration;
use syncgate::certs::CertStore;
use syncgate::cloud::CloudClient;
use syncgate::config::Settings;
use syncgate::notify::Notifier;
use syncgate::pipeline;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("syncgate=debug".parse().expect("valid log directive")),
        )
        .init();

    // Load configuration
    let settings = Settings::from_env().map_err(|e| {
        error!(error = %e, "Failed to load configuration");
        e
    })?;

    info!(
        lb = %settings.lb_name,
        config_file = %settings.config_file.display(),
        certs_dir = %settings.certs_dir.display(),
        render_mode = ?settings.render_mode,
        reload_enabled = settings.reload_enabled,
        poll_interval_secs = settings.poll_interval_secs,
        "Configuration loaded"
    );

    // The certs directory must exist before the first synthesis pass
    CertStore::new(&settings.certs_dir).ensure_dir()?;

    let client = CloudClient::new(&settings.api_url, settings.api_auth.clone())?;
    let notifier = Notifier::new(settings.slack_webhook.clone(), &settings.lb_name);

    // One pipeline run per tick, strictly serial; the first tick fires
    // immediately so startup converges without waiting a full interval
    let mut ticker = tokio::time::interval(Duration::from_secs(settings.poll_interval_secs));

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = pipeline::run_cycle(&settings, &client, &notifier).await {
                    // The next scheduled poll is the retry mechanism
                    error!(error = %e, "Poll cycle failed");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    Ok(())
}
