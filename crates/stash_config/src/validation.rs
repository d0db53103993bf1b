use std::net::SocketAddr;

use url::Url;

use crate::StashConfig;

/// Validation output for a loaded Stash configuration.
#[derive(Debug, Default)]
pub struct ConfigReport {
    warnings: Vec<String>,
    errors: Vec<String>,
}

impl ConfigReport {
    /// Returns true when no errors were found.
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    /// Returns true when at least one error was found.
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    /// Render warnings and errors into a readable, multi-line string.
    pub fn format(&self) -> String {
        let mut out = String::new();
        if !self.errors.is_empty() {
            out.push_str("Errors:\n");
            for err in &self.errors {
                out.push_str("  - ");
                out.push_str(err);
                out.push('\n');
            }
        }
        if !self.warnings.is_empty() {
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str("Warnings:\n");
            for warn in &self.warnings {
                out.push_str("  - ");
                out.push_str(warn);
                out.push('\n');
            }
        }
        out
    }

    fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    fn error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }
}

/// Validate a Stash configuration and return a report of issues.
pub fn validate(cfg: &StashConfig) -> ConfigReport {
    let mut report = ConfigReport::default();

    validate_server(cfg, &mut report);
    validate_origin(cfg, &mut report);
    validate_limits(cfg, &mut report);

    report
}

fn validate_server(cfg: &StashConfig, report: &mut ConfigReport) {
    let server = &cfg.server;

    match server.port {
        None => report.error("server.port is required (--port)"),
        Some(0) => report.warn("server.port is 0; an ephemeral port will be chosen"),
        Some(port) => {
            let addr = format!("{}:{}", server.host, port);
            if addr.parse::<SocketAddr>().is_err() {
                report.warn(format!(
                    "server.host '{}' is not an IP address; it will be resolved at bind time",
                    server.host
                ));
            }
        }
    }

    if server.host.trim().is_empty() {
        report.error("server.host is empty");
    }

    if server.max_connections == 0 {
        report.error("server.max_connections must be greater than 0");
    }
}

fn validate_origin(cfg: &StashConfig, report: &mut ConfigReport) {
    let origin = &cfg.origin;

    match origin.url.as_deref() {
        None => report.error("origin.url is required (--origin)"),
        Some(raw) => match Url::parse(raw) {
            Ok(url) => {
                if !matches!(url.scheme(), "http" | "https") {
                    report.error(format!(
                        "origin.url '{raw}' must use http:// or https:// (got '{}')",
                        url.scheme()
                    ));
                }
                if url.host_str().is_none() {
                    report.error(format!("origin.url '{raw}' has no host"));
                }
                if url.query().is_some() || url.fragment().is_some() {
                    report.warn(format!(
                        "origin.url '{raw}' has a query or fragment; it will be ignored"
                    ));
                }
            }
            Err(e) => report.error(format!("origin.url '{raw}' is not an absolute URL: {e}")),
        },
    }

    if origin.connect_timeout_secs == 0 {
        report.error("origin.connect_timeout_secs must be greater than 0");
    }
    if origin.response_timeout_secs == 0 {
        report.error("origin.response_timeout_secs must be greater than 0");
    }
    if origin.pool_max_per_addr == 0 {
        report.warn("origin.pool_max_per_addr is 0; origin connections will not be reused");
    }
}

fn validate_limits(cfg: &StashConfig, report: &mut ConfigReport) {
    if cfg.limits.max_request_body_bytes == 0 {
        report.warn("limits.max_request_body_bytes is 0; every request with a body will get 413");
    }
    if cfg.limits.max_response_body_bytes == 0 {
        report.error("limits.max_response_body_bytes must be greater than 0");
    }
}
