use std::path::PathBuf;
use std::str::FromStr;

use crate::notify::ShopProfile;

/// Server settings, read once from `BAYBOOK_*` environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub password: String,
    pub max_connections: usize,
    pub metrics_port: Option<u16>,
    /// Spool directory for outgoing mail. Unset: notifications are only logged.
    pub mail_spool: Option<PathBuf>,
    pub shop: ShopProfile,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; unparseable numbers fall back to defaults.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        fn parsed<T: FromStr>(get: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
            get(key).and_then(|s| s.trim().parse().ok())
        }
        Self {
            bind: get("BAYBOOK_BIND").unwrap_or_else(|| "0.0.0.0".into()),
            port: parsed(&get, "BAYBOOK_PORT").unwrap_or(5433),
            data_dir: get("BAYBOOK_DATA_DIR").unwrap_or_else(|| "./data".into()).into(),
            password: get("BAYBOOK_PASSWORD").unwrap_or_else(|| "baybook".into()),
            max_connections: parsed(&get, "BAYBOOK_MAX_CONNECTIONS").unwrap_or(64),
            metrics_port: parsed(&get, "BAYBOOK_METRICS_PORT"),
            mail_spool: get("BAYBOOK_MAIL_SPOOL").filter(|s| !s.is_empty()).map(PathBuf::from),
            shop: ShopProfile {
                name: get("BAYBOOK_SHOP_NAME").unwrap_or_else(|| "baybook".into()),
                location: get("BAYBOOK_SHOP_LOCATION").unwrap_or_default(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults() {
        let config = Config::from_lookup(|_| None);
        assert_eq!(config.bind, "0.0.0.0");
        assert_eq!(config.port, 5433);
        assert_eq!(config.data_dir, PathBuf::from("./data"));
        assert_eq!(config.max_connections, 64);
        assert_eq!(config.metrics_port, None);
        assert_eq!(config.mail_spool, None);
    }

    #[test]
    fn overrides_and_bad_numbers() {
        let env: HashMap<&str, &str> = [
            ("BAYBOOK_PORT", "6000"),
            ("BAYBOOK_MAX_CONNECTIONS", "lots"),
            ("BAYBOOK_METRICS_PORT", "9100"),
            ("BAYBOOK_MAIL_SPOOL", "/var/spool/baybook"),
            ("BAYBOOK_SHOP_NAME", "Bay Tires"),
        ]
        .into_iter()
        .collect();
        let config = Config::from_lookup(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(config.port, 6000);
        assert_eq!(config.max_connections, 64);
        assert_eq!(config.metrics_port, Some(9100));
        assert_eq!(config.mail_spool, Some(PathBuf::from("/var/spool/baybook")));
        assert_eq!(config.shop.name, "Bay Tires");
    }
}
