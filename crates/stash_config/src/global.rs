use serde::Deserialize;

// =======================================================
// SERVER CONFIG + DEFAULTS
// =======================================================
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    /// Required unless only clearing the cache.
    pub port: Option<u16>,
    /// Global limit of concurrently served client connections.
    pub max_connections: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: None,
            max_connections: 1024,
        }
    }
}

impl ServerConfig {
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> Option<u16> {
        self.port
    }

    pub fn max_connections(&self) -> u32 {
        self.max_connections
    }
}

// =======================================================
// ORIGIN CONFIG + DEFAULTS
// =======================================================
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct OriginConfig {
    /// Absolute http:// or https:// URL. Required unless only clearing the cache.
    pub url: Option<String>,

    // Timeouts (seconds), applied per redirect hop
    pub connect_timeout_secs: u64,
    pub response_timeout_secs: u64,

    // Keep-alive pool towards the origin (0 = new connection every hop)
    pub pool_max_per_addr: usize,
    pub pool_idle_timeout_secs: u64,
}

impl Default for OriginConfig {
    fn default() -> Self {
        Self {
            url: None,
            connect_timeout_secs: 5,
            response_timeout_secs: 30,
            pool_max_per_addr: 32,
            pool_idle_timeout_secs: 60,
        }
    }
}

impl OriginConfig {
    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    pub fn connect_timeout_secs(&self) -> u64 {
        self.connect_timeout_secs
    }

    pub fn response_timeout_secs(&self) -> u64 {
        self.response_timeout_secs
    }

    pub fn pool_max_per_addr(&self) -> usize {
        self.pool_max_per_addr
    }

    pub fn pool_idle_timeout_secs(&self) -> u64 {
        self.pool_idle_timeout_secs
    }
}

// =======================================================
// LIMITS + DEFAULTS
// =======================================================
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LimitsConfig {
    // Limits (bytes). Bodies are buffered in full, both ways.
    pub max_request_body_bytes: u64,
    pub max_response_body_bytes: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_request_body_bytes: 10 * 1024 * 1024,
            max_response_body_bytes: 64 * 1024 * 1024,
        }
    }
}

impl LimitsConfig {
    pub fn max_request_body_bytes(&self) -> u64 {
        self.max_request_body_bytes
    }

    pub fn max_response_body_bytes(&self) -> u64 {
        self.max_response_body_bytes
    }
}
