//! Renders the synthesized model into proxy configuration text
//!
//! Rendering is pure: the same model and settings always produce
//! byte-identical output, which is what makes the change detector's
//! fingerprint comparison meaningful.

use crate::config::RenderMode;
use crate::model::{ProxyModel, UpstreamPool, VirtualHost};
use std::path::Path;

/// Start of the replaceable upstream region in splice mode
pub const UPSTREAMS_BEGIN_MARKER: &str = "#upstreams";
/// End of the replaceable upstream region in splice mode
pub const UPSTREAMS_END_MARKER: &str = "#upstreams-end";

// Fixed TLS policy emitted for every TLS server block
const SSL_POLICY: &str = "\
    ssl_session_cache shared:SSL:20m;
    ssl_session_timeout 10m;

    ssl_prefer_server_ciphers       on;
    ssl_protocols                   TLSv1 TLSv1.1 TLSv1.2;
    ssl_ciphers                     ECDH+AESGCM:DH+AESGCM:ECDH+AES256:DH+AES256:ECDH+AES128:DH+AES:ECDH+3DES:DH+3DES:RSA+AESGCM:RSA+AES:RSA+3DES:!aNULL:!MD5:!DSS;

    add_header Strict-Transport-Security \"max-age=31536000\";
";

pub fn render(model: &ProxyModel, mode: RenderMode, certs_dir: &Path) -> String {
    match mode {
        RenderMode::Full => render_full(model, certs_dir),
        RenderMode::Upstreams => render_upstreams(model),
    }
}

/// Complete config file: catch-all default server, upstream pools,
/// plaintext server blocks, TLS server blocks.
fn render_full(model: &ProxyModel, certs_dir: &Path) -> String {
    let mut out = String::new();

    render_default_server(&mut out, certs_dir);

    for pool in &model.upstreams {
        out.push('\n');
        render_upstream(&mut out, pool);
    }

    for host in &model.plain_servers {
        out.push('\n');
        render_plain_server(&mut out, host);
    }

    for host in &model.ssl_servers {
        out.push('\n');
        render_ssl_server(&mut out, host, certs_dir);
    }

    out
}

/// Only the upstream blocks, wrapped in the splice markers
fn render_upstreams(model: &ProxyModel) -> String {
    let mut out = String::new();
    out.push_str(UPSTREAMS_BEGIN_MARKER);
    out.push('\n');
    for pool in &model.upstreams {
        render_upstream(&mut out, pool);
    }
    out.push_str(UPSTREAMS_END_MARKER);
    out
}

/// Requests for unknown hostnames answer 404 on both listeners
fn render_default_server(out: &mut String, certs_dir: &Path) {
    out.push_str("server {\n");
    out.push_str("    listen 80 default_server;\n");
    out.push_str("    listen 443 ssl default_server;\n\n");
    out.push_str("    server_name _;\n\n");
    out.push_str(&format!(
        "    ssl_certificate {}/default.crt;\n",
        certs_dir.display()
    ));
    out.push_str(&format!(
        "    ssl_certificate_key {}/default.crt;\n\n",
        certs_dir.display()
    ));
    out.push_str("    return 404;\n");
    out.push_str("}\n");
}

fn render_upstream(out: &mut String, pool: &UpstreamPool) {
    out.push_str(&format!("upstream {} {{\n", pool.name));
    for server in &pool.servers {
        out.push_str(&format!("    server {};\n", server));
    }
    out.push_str("}\n");
}

fn render_plain_server(out: &mut String, host: &VirtualHost) {
    out.push_str("server {\n");
    out.push_str("    listen 80;\n\n");
    out.push_str(&format!("    server_name {};\n", host.server_name));

    for location in &host.locations {
        out.push('\n');
        out.push_str(&format!("    location {} {{\n", location.path));
        out.push_str(&format!("        proxy_pass http://{};\n", location.upstream));
        out.push_str("        proxy_set_header Host $host;\n");
        out.push_str("        proxy_set_header X-Forwarded-For $remote_addr;\n");
        out.push_str("    }\n");
    }

    for path in &host.redirects {
        out.push('\n');
        out.push_str(&format!("    location {} {{\n", path));
        out.push_str("        return 301 https://$host$request_uri;\n");
        out.push_str("    }\n");
    }

    out.push_str("}\n");
}

fn render_ssl_server(out: &mut String, host: &VirtualHost, certs_dir: &Path) {
    out.push_str("server {\n");
    out.push_str("    listen 443 ssl;\n");
    out.push_str(&format!("    server_name {};\n\n", host.server_name));
    out.push_str(&format!(
        "    ssl_certificate {}/{}.crt;\n",
        certs_dir.display(),
        host.server_name
    ));
    out.push_str(&format!(
        "    ssl_certificate_key {}/{}.crt;\n\n",
        certs_dir.display(),
        host.server_name
    ));
    out.push_str(SSL_POLICY);

    for location in &host.locations {
        out.push('\n');
        out.push_str(&format!("    location {} {{\n", location.path));
        out.push_str(&format!("        proxy_pass http://{};\n", location.upstream));
        out.push_str("        proxy_set_header Host $host;\n");
        out.push_str("        proxy_set_header X-Forwarded-For $remote_addr;\n");
        out.push_str("        proxy_set_header X-Forwarded-Proto $scheme;\n");
        out.push_str("    }\n");
    }

    out.push_str("}\n");
}
