pub mod profiles;

use dotenvy::dotenv;
use serde::Deserialize;
use std::env;
use std::str::FromStr;
use profiles::{Profile, ProfileDefaults};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server_port: u16,
    pub database_url: String,
    pub database_max_connections: u32,
    pub paystack_base_url: String,
    pub paystack_secret_key: String,
    pub paystack_callback_url: Option<String>,
    pub site_url: String,
    pub rate_limit_per_minute: u32,
    pub rate_limit_redis_url: Option<String>,
    /// Key clients by `x-forwarded-for`; only safe behind a proxy that overwrites it.
    pub rate_limit_trust_proxy: bool,
    pub transfers_enabled: bool,
    pub promotion_sweep_schedule: String,
    pub cors_allowed_origins: Option<String>,
}

pub struct ConfigInfo {
    pub config: Config,
    pub profile: Profile,
    pub overrides: Vec<String>,
}

/// Reads variables and records which ones overrode a profile default.
struct Source<F> {
    lookup: F,
    overrides: Vec<String>,
}

impl<F: Fn(&str) -> Option<String>> Source<F> {
    fn string(&mut self, key: &str) -> Option<String> {
        let value = (self.lookup)(key).filter(|v| !v.trim().is_empty())?;
        self.overrides.push(key.to_string());
        Some(value)
    }

    fn parsed<T: FromStr>(&mut self, key: &str, default: T) -> anyhow::Result<T> {
        match self.string(key) {
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|_| anyhow::anyhow!("{} has an invalid value: {}", key, raw)),
            None => Ok(default),
        }
    }

    fn flag(&mut self, key: &str, default: bool) -> anyhow::Result<bool> {
        match self.string(key) {
            Some(raw) => match raw.trim().to_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => Ok(true),
                "0" | "false" | "no" | "off" => Ok(false),
                _ => Err(anyhow::anyhow!("{} must be a boolean, got {}", key, raw)),
            },
            None => Ok(default),
        }
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<ConfigInfo> {
        dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<ConfigInfo>
    where
        F: Fn(&str) -> Option<String>,
    {
        let profile = Profile::parse(lookup("APP_PROFILE").as_deref());
        let defaults = ProfileDefaults::for_profile(profile);
        let mut source = Source {
            lookup,
            overrides: Vec::new(),
        };

        let server_port = source.parsed("SERVER_PORT", defaults.server_port)?;
        let database_url = source
            .string("DATABASE_URL")
            .ok_or_else(|| anyhow::anyhow!("DATABASE_URL must be set"))?;
        let database_max_connections =
            source.parsed("DATABASE_MAX_CONNECTIONS", defaults.database_max_connections)?;

        let paystack_base_url = source
            .string("PAYSTACK_BASE_URL")
            .unwrap_or(defaults.paystack_base_url)
            .trim_end_matches('/')
            .to_string();
        let paystack_secret_key = source
            .string("PAYSTACK_SECRET_KEY")
            .or(defaults.paystack_secret_key)
            .ok_or_else(|| {
                anyhow::anyhow!("PAYSTACK_SECRET_KEY must be set for the {} profile", profile.as_str())
            })?;
        let paystack_callback_url = source.string("PAYSTACK_CALLBACK_URL");
        let site_url = source
            .string("SITE_URL")
            .unwrap_or(defaults.site_url)
            .trim_end_matches('/')
            .to_string();

        let rate_limit_per_minute = source.parsed("RATE_LIMIT_PER_MINUTE", defaults.rate_limit_per_minute)?;
        if rate_limit_per_minute == 0 {
            anyhow::bail!("RATE_LIMIT_PER_MINUTE must be greater than zero");
        }
        let rate_limit_redis_url = source.string("RATE_LIMIT_REDIS_URL");
        let rate_limit_trust_proxy = source.flag("RATE_LIMIT_TRUST_PROXY", false)?;
        let transfers_enabled = source.flag("TRANSFERS_ENABLED", defaults.transfers_enabled)?;

        let promotion_sweep_schedule = source
            .string("PROMOTION_SWEEP_SCHEDULE")
            .unwrap_or(defaults.promotion_sweep_schedule);
        cron::Schedule::from_str(&promotion_sweep_schedule).map_err(|e| {
            anyhow::anyhow!("PROMOTION_SWEEP_SCHEDULE is not a valid cron expression: {}", e)
        })?;

        let cors_allowed_origins = source.string("CORS_ALLOWED_ORIGINS").or(defaults.cors_allowed_origins);

        Ok(ConfigInfo {
            config: Config {
                server_port,
                database_url,
                database_max_connections,
                paystack_base_url,
                paystack_secret_key,
                paystack_callback_url,
                site_url,
                rate_limit_per_minute,
                rate_limit_redis_url,
                rate_limit_trust_proxy,
                transfers_enabled,
                promotion_sweep_schedule,
                cors_allowed_origins,
            },
            profile,
            overrides: source.overrides,
        })
    }
}

/// Replaces the password in a connection URL with asterisks.
pub fn mask_password(url: &str) -> String {
    let Some((scheme, rest)) = url.split_once("://") else {
        return url.to_string();
    };
    let Some((credentials, host)) = rest.rsplit_once('@') else {
        return url.to_string();
    };
    match credentials.split_once(':') {
        Some((user, _)) => format!("{}://{}:****@{}", scheme, user, host),
        None => url.to_string(),
    }
}

/// Keeps the first four characters of a secret.
pub fn mask_secret(secret: &str) -> String {
    if secret.is_empty() {
        return "(unset)".to_string();
    }
    let visible: String = secret.chars().take(4).collect();
    format!("{}****", visible)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> anyhow::Result<ConfigInfo> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(move |key| vars.get(key).cloned())
    }

    #[test]
    fn test_development_defaults() {
        let info = load(&[("DATABASE_URL", "postgres://localhost/estate")]).unwrap();
        assert_eq!(info.profile, Profile::Development);
        assert_eq!(info.config.server_port, 3000);
        assert!(!info.config.transfers_enabled);
        assert_eq!(info.config.paystack_secret_key, "");
        assert!(!info.config.rate_limit_trust_proxy);
        assert_eq!(info.overrides, vec!["DATABASE_URL".to_string()]);
    }

    #[test]
    fn test_database_url_required() {
        assert!(load(&[]).is_err());
    }

    #[test]
    fn test_production_requires_paystack_key() {
        let missing = load(&[("APP_PROFILE", "prod"), ("DATABASE_URL", "postgres://db/estate")]);
        assert!(missing.is_err());

        let info = load(&[
            ("APP_PROFILE", "production"),
            ("DATABASE_URL", "postgres://db/estate"),
            ("PAYSTACK_SECRET_KEY", "sk_live_abc"),
            ("TRANSFERS_ENABLED", "off"),
            ("SITE_URL", "https://homes.example.com/"),
            ("RATE_LIMIT_TRUST_PROXY", "true"),
        ])
        .unwrap();
        assert_eq!(info.profile, Profile::Production);
        assert!(info.config.rate_limit_trust_proxy);
        assert!(!info.config.transfers_enabled);
        assert_eq!(info.config.site_url, "https://homes.example.com");
    }

    #[test]
    fn test_invalid_values_rejected() {
        let base = ("DATABASE_URL", "postgres://db/estate");
        assert!(load(&[base, ("SERVER_PORT", "eighty")]).is_err());
        assert!(load(&[base, ("TRANSFERS_ENABLED", "maybe")]).is_err());
        assert!(load(&[base, ("RATE_LIMIT_PER_MINUTE", "0")]).is_err());
        assert!(load(&[base, ("PROMOTION_SWEEP_SCHEDULE", "*/5 * * * *")]).is_err());
    }

    #[test]
    fn test_masking() {
        assert_eq!(
            mask_password("postgres://estate:hunter2@db:5432/estate"),
            "postgres://estate:****@db:5432/estate"
        );
        assert_eq!(mask_password("postgres://db/estate"), "postgres://db/estate");
        assert_eq!(mask_secret("sk_test_123456"), "sk_t****");
        assert_eq!(mask_secret(""), "(unset)");
    }
}
