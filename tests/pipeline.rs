//! End-to-end synthesis → render → apply over a temporary filesystem,
//! with the proxy's validate/reload commands disabled or stubbed.

use std::fs;
use syncgate::apply::{self, ApplyOutcome};
use syncgate::certs::CertStore;
use syncgate::cloud::{ContainerRecord, EnvPair, RUNNING_STATE};
use syncgate::config::{RenderMode, Settings};
use syncgate::model;
use syncgate::render;
use tempfile::TempDir;

fn record(uuid: &str, ip: &str, env: &[(&str, &str)]) -> ContainerRecord {
    ContainerRecord {
        uuid: uuid.to_string(),
        state: RUNNING_STATE.to_string(),
        private_ip: ip.to_string(),
        container_envvars: env
            .iter()
            .map(|(k, v)| EnvPair {
                key: k.to_string(),
                value: v.to_string(),
            })
            .collect(),
    }
}

fn settings(dir: &TempDir, mode: RenderMode) -> Settings {
    Settings {
        lb_name: "edge-1".to_string(),
        api_url: "https://cloud.example.com".to_string(),
        api_auth: None,
        slack_webhook: None,
        config_file: dir.path().join("default.conf"),
        certs_dir: dir.path().join("certs"),
        container_limit: 25,
        reload_enabled: false,
        validate_command: "true".to_string(),
        reload_command: "true".to_string(),
        render_mode: mode,
        poll_interval_secs: 30,
    }
}

fn sample_records() -> Vec<ContainerRecord> {
    vec![
        record(
            "c-1",
            "10.7.0.2",
            &[
                ("NGINX_LB", "edge-1"),
                ("DOCKERCLOUD_SERVICE_HOSTNAME", "api"),
                ("NGINX_VIRTUAL_HOST", "api.example.com"),
                ("NGINX_PORT", "8080"),
                ("NGINX_CERT", "-----BEGIN CERT-----\\npem\\n-----END CERT-----"),
            ],
        ),
        record(
            "c-2",
            "10.7.0.3",
            &[
                ("NGINX_LB", "edge-1"),
                ("DOCKERCLOUD_SERVICE_HOSTNAME", "api"),
                ("NGINX_VIRTUAL_HOST", "api.example.com"),
                ("NGINX_PORT", "8080"),
            ],
        ),
        record(
            "c-3",
            "10.7.0.4",
            &[
                ("NGINX_LB", "edge-1"),
                ("DOCKERCLOUD_SERVICE_HOSTNAME", "web"),
                ("NGINX_VIRTUAL_HOST", "www.example.com"),
            ],
        ),
    ]
}

#[tokio::test]
async fn full_cycle_applies_then_noops_when_unchanged() {
    let dir = TempDir::new().unwrap();
    let settings = settings(&dir, RenderMode::Full);

    let certs = CertStore::new(&settings.certs_dir);
    certs.ensure_dir().unwrap();

    // First pass: synthesize, render, apply
    let model = model::synthesize(&sample_records(), &certs).unwrap();
    let rendered = render::render(&model, settings.render_mode, &settings.certs_dir);

    assert!(apply::config_changed(
        &settings.config_file,
        settings.render_mode,
        &rendered
    ));
    let outcome = apply::apply(&settings, &rendered).await.unwrap();
    assert_eq!(outcome, ApplyOutcome::Applied);

    // Both containers of the api service landed in one pool
    let written = fs::read_to_string(&settings.config_file).unwrap();
    assert_eq!(written, rendered);
    assert!(written.contains("upstream api {"));
    assert!(written.contains("server 10.7.0.2:8080;"));
    assert!(written.contains("server 10.7.0.3:8080;"));
    assert!(written.contains("upstream web {"));

    // TLS host got its certificate and redirect; plain host proxies
    assert!(settings.certs_dir.join("api.example.com.crt").exists());
    assert!(written.contains("ssl_certificate"));
    assert!(written.contains("return 301 https://$host$request_uri;"));
    assert!(written.contains("proxy_pass http://web;"));

    // Second pass over identical input: byte-identical render, no-op
    let model2 = model::synthesize(&sample_records(), &certs).unwrap();
    let rendered2 = render::render(&model2, settings.render_mode, &settings.certs_dir);
    assert_eq!(rendered, rendered2);
    assert!(!apply::config_changed(
        &settings.config_file,
        settings.render_mode,
        &rendered2
    ));
}

#[tokio::test]
async fn splice_cycle_rewrites_only_the_marker_region() {
    let dir = TempDir::new().unwrap();
    let settings = settings(&dir, RenderMode::Upstreams);

    let certs = CertStore::new(&settings.certs_dir);
    certs.ensure_dir().unwrap();

    // An operator-managed config file with a stale upstream region
    fs::write(
        &settings.config_file,
        "server {\n    listen 80;\n}\n#upstreams\nupstream stale {\n}\n#upstreams-end\n",
    )
    .unwrap();

    let model = model::synthesize(&sample_records(), &certs).unwrap();
    let rendered = render::render(&model, settings.render_mode, &settings.certs_dir);

    assert!(apply::config_changed(
        &settings.config_file,
        settings.render_mode,
        &rendered
    ));
    let outcome = apply::apply(&settings, &rendered).await.unwrap();
    assert_eq!(outcome, ApplyOutcome::Applied);

    let written = fs::read_to_string(&settings.config_file).unwrap();
    assert!(written.starts_with("server {\n    listen 80;\n}\n"));
    assert!(written.ends_with("#upstreams-end\n"));
    assert!(written.contains("upstream api {"));
    assert!(!written.contains("stale"));

    // Unchanged model, unchanged region: the detector now no-ops
    assert!(!apply::config_changed(
        &settings.config_file,
        settings.render_mode,
        &rendered
    ));
}

#[tokio::test]
async fn failed_validation_leaves_written_config_in_place() {
    let dir = TempDir::new().unwrap();
    let mut settings = settings(&dir, RenderMode::Full);
    settings.reload_enabled = true;
    settings.validate_command = "sh -c 'echo nginx: [emerg] boom >&2; exit 1'".to_string();

    let certs = CertStore::new(&settings.certs_dir);
    certs.ensure_dir().unwrap();

    let model = model::synthesize(&sample_records(), &certs).unwrap();
    let rendered = render::render(&model, settings.render_mode, &settings.certs_dir);

    let outcome = apply::apply(&settings, &rendered).await.unwrap();
    match outcome {
        ApplyOutcome::Failed { error } => assert!(error.contains("boom")),
        other => panic!("expected Failed, got {:?}", other),
    }

    // Write is not reverted; the file holds exactly the failing text
    assert_eq!(fs::read_to_string(&settings.config_file).unwrap(), rendered);
}

#[tokio::test]
async fn upstream_only_containers_render_without_server_blocks() {
    let dir = TempDir::new().unwrap();
    let settings = settings(&dir, RenderMode::Full);

    let certs = CertStore::new(&settings.certs_dir);
    certs.ensure_dir().unwrap();

    let records = vec![record(
        "c-1",
        "10.7.0.2",
        &[
            ("NGINX_LB", "edge-1"),
            ("DOCKERCLOUD_SERVICE_HOSTNAME", "worker"),
        ],
    )];

    let model = model::synthesize(&records, &certs).unwrap();
    let rendered = render::render(&model, settings.render_mode, &settings.certs_dir);

    assert!(rendered.contains("upstream worker {"));
    assert!(rendered.contains("server 10.7.0.2:80;"));
    // Only the catch-all server block is present
    assert_eq!(rendered.matches("server {").count(), 1);
}
