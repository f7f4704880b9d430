//! Remote game-server addresses

use serde::{Deserialize, Serialize};
use std::fmt;

/// Host and port of a game-coordination server
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RemoteAddress {
    pub host: String,
    pub port: u16,
}

impl RemoteAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Thread-name-safe form: dots in the host become dashes
    pub fn slug(&self) -> String {
        format!("{}-{}", self.host.replace('.', "-"), self.port)
    }
}

impl fmt::Display for RemoteAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let addr = RemoteAddress::new("example.com", 38281);
        assert_eq!(addr.to_string(), "example.com:38281");
    }

    #[test]
    fn test_slug() {
        let addr = RemoteAddress::new("trezapalooza.com", 38281);
        assert_eq!(addr.slug(), "trezapalooza-com-38281");
    }
}
