//! Change detection and the write → validate → reload control flow
//!
//! A changed render is written to the active config file, checked with the
//! proxy's validate command, then activated with its reload command. A
//! failing command ends the cycle in `Failed` with the captured output;
//! the written file is deliberately left in place so the notification can
//! reference exactly what is on disk. The next poll cycle is the retry.

use crate::config::{RenderMode, Settings};
use crate::render::{UPSTREAMS_BEGIN_MARKER, UPSTREAMS_END_MARKER};
use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Terminal state of one apply run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Config written and the proxy reloaded (or reload is disabled)
    Applied,
    /// Validate or reload failed; the written file is left as-is
    Failed { error: String },
}

/// Content fingerprint used to decide whether anything changed
pub fn fingerprint(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Compare the rendered text against what is currently active.
///
/// In full mode the whole file is compared; in splice mode only the marker
/// region is, since the rest of the file is not ours. A missing file or
/// missing markers count as changed and let the apply step surface any
/// real problem.
pub fn config_changed(config_file: &Path, mode: RenderMode, rendered: &str) -> bool {
    let current = match fs::read_to_string(config_file) {
        Ok(current) => current,
        Err(_) => return true,
    };

    let active_region = match mode {
        RenderMode::Full => current.as_str(),
        RenderMode::Upstreams => match extract_region(&current) {
            Some(region) => region,
            None => return true,
        },
    };

    fingerprint(active_region.as_bytes()) != fingerprint(rendered.as_bytes())
}

/// Byte range of the marker-delimited upstream region, markers included
fn region_bounds(text: &str) -> Option<(usize, usize)> {
    let start = text.find(UPSTREAMS_BEGIN_MARKER)?;
    let after_begin = start + UPSTREAMS_BEGIN_MARKER.len();
    let end = text[after_begin..].find(UPSTREAMS_END_MARKER)?;
    Some((start, after_begin + end + UPSTREAMS_END_MARKER.len()))
}

fn extract_region(text: &str) -> Option<&str> {
    region_bounds(text).map(|(start, end)| &text[start..end])
}

/// Replace the marker region of `existing` with `fragment`
pub fn splice_region(existing: &str, fragment: &str) -> Result<String> {
    let (start, end) = region_bounds(existing).with_context(|| {
        format!(
            "active config has no {} .. {} region to splice into",
            UPSTREAMS_BEGIN_MARKER, UPSTREAMS_END_MARKER
        )
    })?;

    Ok(format!("{}{}{}", &existing[..start], fragment, &existing[end..]))
}

/// Run the apply state machine for an already-detected change:
/// Write, then Validate and Reload unless reload is disabled.
pub async fn apply(settings: &Settings, rendered: &str) -> Result<ApplyOutcome> {
    let text = match settings.render_mode {
        RenderMode::Full => rendered.to_string(),
        RenderMode::Upstreams => {
            let existing = fs::read_to_string(&settings.config_file).with_context(|| {
                format!(
                    "Failed to read {} for splicing",
                    settings.config_file.display()
                )
            })?;
            splice_region(&existing, rendered)?
        }
    };

    fs::write(&settings.config_file, &text)
        .with_context(|| format!("Failed to write {}", settings.config_file.display()))?;
    info!(
        path = %settings.config_file.display(),
        bytes = text.len(),
        "Wrote proxy configuration"
    );

    if !settings.reload_enabled {
        debug!("Validate and reload are disabled, config written only");
        return Ok(ApplyOutcome::Applied);
    }

    info!(command = %settings.validate_command, "Validating proxy configuration");
    if let Err(error) = run_command(&settings.validate_command).await {
        warn!(error = %error, "Proxy config validation failed");
        return Ok(ApplyOutcome::Failed { error });
    }

    info!(command = %settings.reload_command, "Reloading proxy");
    if let Err(error) = run_command(&settings.reload_command).await {
        warn!(error = %error, "Proxy reload failed");
        return Ok(ApplyOutcome::Failed { error });
    }

    info!("Proxy reload successful");
    Ok(ApplyOutcome::Applied)
}

/// Run a configured command line, capturing output. Returns the combined
/// stderr/stdout as the error detail on non-zero exit or spawn failure.
async fn run_command(command_line: &str) -> Result<(), String> {
    let words = shell_words::split(command_line)
        .map_err(|e| format!("invalid command '{}': {}", command_line, e))?;
    let (program, args) = words
        .split_first()
        .ok_or_else(|| format!("empty command '{}'", command_line))?;

    let output = match Command::new(program).args(args).output().await {
        Ok(output) => output,
        Err(e) => return Err(format!("failed to run '{}': {}", command_line, e)),
    };

    if output.status.success() {
        return Ok(());
    }

    let mut detail = String::from_utf8_lossy(&output.stderr).trim_end().to_string();
    let stdout = String::from_utf8_lossy(&output.stdout);
    if !stdout.trim().is_empty() {
        if !detail.is_empty() {
            detail.push('\n');
        }
        detail.push_str(stdout.trim_end());
    }

    Err(format!(
        "'{}' exited with {}: {}",
        command_line, output.status, detail
    ))
}
