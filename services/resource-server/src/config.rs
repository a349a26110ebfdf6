use anyhow::{Context, Result, bail};
use gatekeeper_authz::{MAX_CLOCK_SKEW_SECS, Permissions};
use serde::Deserialize;
use std::fs;
use std::net::SocketAddr;
use std::time::Duration;

pub const DEFAULT_BIND: &str = "0.0.0.0:3001";
pub const DEFAULT_METRICS_BIND: &str = "0.0.0.0:9090";
pub const DEFAULT_ISSUER: &str = "gatekeeper";
pub const DEFAULT_ACCESS_TTL_SECS: u64 = 300;
pub const DEFAULT_REFRESH_TTL_SECS: u64 = 86_400;

// Resource server configuration sourced from environment variables, with an
// optional YAML override file.
#[derive(Debug, Clone)]
pub struct ResourceServerConfig {
    pub bind_addr: SocketAddr,
    pub metrics_bind: SocketAddr,
    pub issuer: String,
    pub trusted_issuers: Vec<String>,
    pub secret: String,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
    pub leeway_secs: u64,
    pub users: Vec<UserRecord>,
}

/// Identity and permission claims served by the local providers. Users
/// without `credential_sha256` cannot log in.
#[derive(Debug, Clone, Deserialize)]
pub struct UserRecord {
    pub identity_id: String,
    pub display_name: String,
    /// Hex SHA-256 of the user's login credential.
    #[serde(default)]
    pub credential_sha256: Option<String>,
    #[serde(default)]
    pub permissions: Permissions,
}

#[derive(Debug, Deserialize)]
struct ResourceServerConfigOverride {
    bind_addr: Option<String>,
    metrics_bind: Option<String>,
    issuer: Option<String>,
    trusted_issuers: Option<Vec<String>>,
    secret: Option<String>,
    access_ttl_secs: Option<u64>,
    refresh_ttl_secs: Option<u64>,
    leeway_secs: Option<u64>,
    users: Option<Vec<UserRecord>>,
}

impl ResourceServerConfig {
    pub fn from_env() -> Result<Self> {
        let bind_addr = std::env::var("GATEKEEPER_BIND")
            .unwrap_or_else(|_| DEFAULT_BIND.to_string())
            .parse()
            .with_context(|| "parse GATEKEEPER_BIND")?;
        let metrics_bind = std::env::var("GATEKEEPER_METRICS_BIND")
            .unwrap_or_else(|_| DEFAULT_METRICS_BIND.to_string())
            .parse()
            .with_context(|| "parse GATEKEEPER_METRICS_BIND")?;
        let issuer =
            std::env::var("GATEKEEPER_ISSUER").unwrap_or_else(|_| DEFAULT_ISSUER.to_string());
        let trusted_issuers = match std::env::var("GATEKEEPER_TRUSTED_ISSUERS") {
            Ok(value) => parse_issuer_list(&value),
            Err(_) => vec![issuer.clone()],
        };
        let secret = std::env::var("GATEKEEPER_SECRET").unwrap_or_default();
        let access_ttl = env_secs("GATEKEEPER_ACCESS_TTL_SECS", DEFAULT_ACCESS_TTL_SECS)?;
        let refresh_ttl = env_secs("GATEKEEPER_REFRESH_TTL_SECS", DEFAULT_REFRESH_TTL_SECS)?;
        let leeway_secs = match std::env::var("GATEKEEPER_LEEWAY_SECS") {
            Ok(value) => value
                .parse()
                .with_context(|| "parse GATEKEEPER_LEEWAY_SECS")?,
            Err(_) => 0,
        };
        Ok(Self {
            bind_addr,
            metrics_bind,
            issuer,
            trusted_issuers,
            secret,
            access_ttl: Duration::from_secs(access_ttl),
            refresh_ttl: Duration::from_secs(refresh_ttl),
            leeway_secs,
            users: Vec::new(),
        })
    }

    pub fn from_env_or_yaml() -> Result<Self> {
        let mut config = Self::from_env()?;
        if let Ok(path) = std::env::var("GATEKEEPER_CONFIG") {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("read GATEKEEPER_CONFIG: {path}"))?;
            config.apply_yaml(&contents)?;
        }
        config.validate()?;
        Ok(config)
    }

    fn apply_yaml(&mut self, contents: &str) -> Result<()> {
        let override_cfg: ResourceServerConfigOverride =
            serde_yaml::from_str(contents).with_context(|| "parse resource server config yaml")?;
        if let Some(value) = override_cfg.bind_addr {
            self.bind_addr = value.parse().with_context(|| "parse bind_addr")?;
        }
        if let Some(value) = override_cfg.metrics_bind {
            self.metrics_bind = value.parse().with_context(|| "parse metrics_bind")?;
        }
        if let Some(value) = override_cfg.issuer {
            self.issuer = value;
        }
        if let Some(value) = override_cfg.trusted_issuers {
            self.trusted_issuers = value;
        }
        if let Some(value) = override_cfg.secret {
            self.secret = value;
        }
        if let Some(value) = override_cfg.access_ttl_secs {
            self.access_ttl = Duration::from_secs(value);
        }
        if let Some(value) = override_cfg.refresh_ttl_secs {
            self.refresh_ttl = Duration::from_secs(value);
        }
        if let Some(value) = override_cfg.leeway_secs {
            self.leeway_secs = value;
        }
        if let Some(value) = override_cfg.users {
            self.users = value;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.secret.is_empty() {
            bail!("GATEKEEPER_SECRET must be set");
        }
        if self.trusted_issuers.is_empty() {
            bail!("at least one trusted issuer is required");
        }
        if self.leeway_secs > MAX_CLOCK_SKEW_SECS {
            bail!("leeway_secs must be at most {MAX_CLOCK_SKEW_SECS}");
        }
        if self.access_ttl.is_zero() {
            bail!("access token ttl must be positive");
        }
        Ok(())
    }
}

fn env_secs(key: &str, default: u64) -> Result<u64> {
    match std::env::var(key) {
        Ok(value) => value.parse().with_context(|| format!("parse {key}")),
        Err(_) => Ok(default),
    }
}

fn parse_issuer_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|issuer| !issuer.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> ResourceServerConfig {
        ResourceServerConfig {
            bind_addr: DEFAULT_BIND.parse().expect("bind"),
            metrics_bind: DEFAULT_METRICS_BIND.parse().expect("metrics"),
            issuer: DEFAULT_ISSUER.to_string(),
            trusted_issuers: vec![DEFAULT_ISSUER.to_string()],
            secret: "dev-secret".to_string(),
            access_ttl: Duration::from_secs(DEFAULT_ACCESS_TTL_SECS),
            refresh_ttl: Duration::from_secs(DEFAULT_REFRESH_TTL_SECS),
            leeway_secs: 0,
            users: Vec::new(),
        }
    }

    #[test]
    fn issuer_list_is_trimmed_and_filtered() {
        assert_eq!(
            parse_issuer_list(" svc-a, svc-b ,,"),
            vec!["svc-a".to_string(), "svc-b".to_string()]
        );
    }

    #[test]
    fn yaml_overrides_fields() {
        let mut config = base();
        config
            .apply_yaml(
                "bind_addr: 127.0.0.1:4000\nissuer: svc-a\ntrusted_issuers: [svc-a, svc-c]\nleeway_secs: 30\n",
            )
            .expect("yaml");
        assert_eq!(config.bind_addr.port(), 4000);
        assert_eq!(config.issuer, "svc-a");
        assert_eq!(config.trusted_issuers, vec!["svc-a", "svc-c"]);
        assert_eq!(config.leeway_secs, 30);
        assert_eq!(config.metrics_bind, base().metrics_bind);
    }

    #[test]
    fn yaml_loads_users_with_permissions() {
        let mut config = base();
        config
            .apply_yaml(
                "users:\n  - identity_id: u1\n    display_name: User One\n    credential_sha256: 00ff\n    permissions:\n      role: admin\n      tier: 2\n  - identity_id: u2\n    display_name: User Two\n",
            )
            .expect("yaml");
        assert_eq!(config.users.len(), 2);
        assert_eq!(config.users[0].credential_sha256.as_deref(), Some("00ff"));
        assert!(config.users[1].credential_sha256.is_none());
        assert_eq!(config.users[0].permissions["role"], serde_json::json!("admin"));
        assert_eq!(config.users[0].permissions["tier"], serde_json::json!(2));
        assert!(config.users[1].permissions.is_empty());
    }

    #[test]
    fn yaml_rejects_bad_addresses() {
        let mut config = base();
        assert!(config.apply_yaml("bind_addr: not-an-addr\n").is_err());
    }

    #[test]
    fn validate_requires_secret_and_bounded_leeway() {
        base().validate().expect("valid");

        let mut missing_secret = base();
        missing_secret.secret.clear();
        assert!(missing_secret.validate().is_err());

        let mut wide_leeway = base();
        wide_leeway.leeway_secs = MAX_CLOCK_SKEW_SECS + 1;
        assert!(wide_leeway.validate().is_err());

        let mut no_issuers = base();
        no_issuers.trusted_issuers.clear();
        assert!(no_issuers.validate().is_err());
    }
}
