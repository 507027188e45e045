//! Configuration contract.

use crate::reply::Encoding;

/// Default base address pub/sub notifications are routed under.
pub const DEFAULT_ADDRESS: &str = "io.vertx.mod-redis";

/// Recognized configuration keys and their effects. Concrete serialization
/// of this record is out of scope for this crate; callers construct it
/// directly or via the builder methods.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub encoding: Encoding,
    /// Reserved. If `true`, `Client::start` logs a deprecation warning; the
    /// flag otherwise has no effect.
    pub binary: bool,
    pub address: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            host: "localhost".to_owned(),
            port: 6379,
            encoding: Encoding::Utf8,
            binary: false,
            address: DEFAULT_ADDRESS.to_owned(),
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_encoding(mut self, encoding: Encoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn with_binary(mut self, binary: bool) -> Self {
        self.binary = binary;
        self
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = address.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = Config::default();
        assert_eq!(cfg.host, "localhost");
        assert_eq!(cfg.port, 6379);
        assert_eq!(cfg.encoding, Encoding::Utf8);
        assert!(!cfg.binary);
        assert_eq!(cfg.address, "io.vertx.mod-redis");
    }

    #[test]
    fn builder_overrides_apply() {
        let cfg = Config::new().with_host("example.com").with_port(7000);
        assert_eq!(cfg.host, "example.com");
        assert_eq!(cfg.port, 7000);
    }
}
