use serde::{Deserialize, Serialize};

pub const ENV_CONFIG_PATH: &str = "INCUBATOR_CONFIG";
pub const ENV_DEVICE_URL: &str = "INCUBATOR_DEVICE_URL";
pub const ENV_POLL_MS: &str = "INCUBATOR_POLL_MS";
pub const ENV_TIMEOUT_MS: &str = "INCUBATOR_TIMEOUT_MS";
pub const ENV_HTTP_PORT: &str = "PORT";
pub const ENV_HTTP_BIND: &str = "INCUBATOR_BIND";
pub const ENV_WEB_ROOT: &str = "INCUBATOR_WEB_ROOT";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DeviceConfig {
    pub base_url: String,
    pub poll_interval_ms: u64,
    pub request_timeout_ms: u64,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            base_url: "http://192.168.4.1".to_string(),
            poll_interval_ms: 1_000,
            request_timeout_ms: 2_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
    pub web_root: Option<String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 3000,
            web_root: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BridgeConfig {
    pub device: DeviceConfig,
    pub http: HttpConfig,
}

impl BridgeConfig {
    /// Applies overrides from `lookup` (normally the process environment).
    /// Unparseable numbers are ignored and the previous value kept.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(ENV_DEVICE_URL) {
            self.device.base_url = url;
        }
        if let Some(ms) = lookup(ENV_POLL_MS).and_then(|value| value.parse::<u64>().ok()) {
            self.device.poll_interval_ms = ms;
        }
        if let Some(ms) = lookup(ENV_TIMEOUT_MS).and_then(|value| value.parse::<u64>().ok()) {
            self.device.request_timeout_ms = ms;
        }
        if let Some(port) = lookup(ENV_HTTP_PORT).and_then(|value| value.parse::<u16>().ok()) {
            self.http.port = port;
        }
        if let Some(bind) = lookup(ENV_HTTP_BIND) {
            self.http.bind = bind;
        }
        if let Some(root) = lookup(ENV_WEB_ROOT) {
            self.http.web_root = Some(root).filter(|root| !root.trim().is_empty());
        }
    }

    pub fn sanitize(&mut self) {
        self.device.sanitize();
        if self.http.bind.trim().is_empty() {
            self.http.bind = HttpConfig::default().bind;
        }
    }
}

impl DeviceConfig {
    pub fn sanitize(&mut self) {
        let trimmed = self.device_url_trimmed();
        self.base_url = if trimmed.is_empty() {
            Self::default().base_url
        } else {
            trimmed
        };
        self.poll_interval_ms = self.poll_interval_ms.clamp(100, 60_000);
        self.request_timeout_ms = self.request_timeout_ms.clamp(100, 30_000);
    }

    fn device_url_trimmed(&self) -> String {
        self.base_url.trim().trim_end_matches('/').to_string()
    }
}
