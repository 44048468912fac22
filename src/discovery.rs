//! Container discovery: inventory listing, detail fan-out, eligibility filter

use crate::cloud::{CloudClient, ContainerRecord, ENV_LB};
use crate::config::Settings;
use anyhow::Result;
use futures::future::try_join_all;
use tracing::{debug, info};

/// A container is balanced by this instance when it opted in via `NGINX_LB`
/// and is currently running. Stable over input order, no side effects.
pub fn is_eligible(record: &ContainerRecord, lb_name: &str) -> bool {
    record.env().get(ENV_LB) == Some(lb_name) && record.is_running()
}

/// List the inventory, fetch every detail record concurrently, and keep the
/// containers this proxy instance balances.
///
/// The detail lookups are a single all-or-nothing join: one failed fetch
/// aborts the whole cycle rather than producing a partial model.
pub async fn discover(client: &CloudClient, settings: &Settings) -> Result<Vec<ContainerRecord>> {
    let summaries = client.list(settings.container_limit).await?;
    debug!(count = summaries.len(), "Fetched container inventory");

    let records = try_join_all(
        summaries
            .iter()
            .map(|summary| client.detail(&summary.resource_uri)),
    )
    .await?;

    let eligible: Vec<ContainerRecord> = records
        .into_iter()
        .filter(|record| is_eligible(record, &settings.lb_name))
        .collect();

    info!(
        eligible = eligible.len(),
        lb = %settings.lb_name,
        "Selected containers to balance"
    );

    Ok(eligible)
}
