//! Configuration types.

use std::time::Duration;

use crate::error::ConfigError;

/// Deployment environment, reported by the health check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
        }
    }

    pub fn is_development(&self) -> bool {
        matches!(self, Self::Development)
    }
}

/// Chat session lifecycle settings.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Sessions older than this (measured from start) are purged.
    pub max_age: Duration,
    /// How often the background sweeper runs.
    pub sweep_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_age: Duration::from_secs(24 * 3600), // 24 hours
            sweep_interval: Duration::from_secs(300),
        }
    }
}

/// Per-client rate limit for the chatbot endpoints.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Requests allowed per window.
    pub max_requests: u32,
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 100,
            window: Duration::from_secs(15 * 60),
        }
    }
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct FunnelConfig {
    pub host: String,
    pub port: u16,
    pub allowed_origins: Vec<String>,
    pub environment: Environment,
    pub session: SessionConfig,
    /// Lead history entries older than this are pruned.
    pub history_retention: Duration,
    pub rate_limit: RateLimitConfig,
    /// Sender mailbox for composed emails, e.g. `Team <team@example.com>`.
    pub email_from: String,
    /// Reverse proxies in front of the server. Zero means the peer address
    /// is the client; `n` trusts the last `n` `X-Forwarded-For` hops.
    pub trusted_proxies: usize,
}

impl Default for FunnelConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            allowed_origins: vec!["http://localhost:3000".to_string()],
            environment: Environment::Development,
            session: SessionConfig::default(),
            history_retention: Duration::from_secs(30 * 24 * 3600), // 30 days
            rate_limit: RateLimitConfig::default(),
            email_from: "Scaler Masterclass <masterclass@scaler.com>".to_string(),
            trusted_proxies: 0,
        }
    }
}

impl FunnelConfig {
    /// Build config from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let host = lookup("FUNNEL_HOST").unwrap_or(defaults.host);
        let email_from = lookup("FUNNEL_EMAIL_FROM").unwrap_or(defaults.email_from);
        let port = parse_or(&lookup, "PORT", defaults.port)?;

        let allowed_origins = match lookup("ALLOWED_ORIGINS") {
            Some(raw) => {
                let origins: Vec<String> = raw
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect();
                if origins.is_empty() {
                    defaults.allowed_origins
                } else {
                    origins
                }
            }
            None => defaults.allowed_origins,
        };

        let environment = match lookup("FUNNEL_ENV")
            .or_else(|| lookup("NODE_ENV"))
            .as_deref()
        {
            None | Some("development") | Some("dev") => Environment::Development,
            Some("production") | Some("prod") => Environment::Production,
            Some(other) => {
                return Err(ConfigError::InvalidValue {
                    key: "FUNNEL_ENV".into(),
                    message: format!("unknown environment '{other}'"),
                });
            }
        };

        let max_age_hours: u64 = parse_or(&lookup, "FUNNEL_SESSION_MAX_AGE_HOURS", 24)?;
        let sweep_secs: u64 = parse_or(&lookup, "FUNNEL_SESSION_SWEEP_SECS", 300)?;
        let retention_days: u64 = parse_or(&lookup, "FUNNEL_HISTORY_RETENTION_DAYS", 30)?;
        let max_requests: u32 = parse_or(&lookup, "FUNNEL_CHAT_RATE_LIMIT", 100)?;
        let window_secs: u64 = parse_or(&lookup, "FUNNEL_CHAT_RATE_WINDOW_SECS", 900)?;
        let trusted_proxies: usize = parse_or(&lookup, "FUNNEL_TRUSTED_PROXIES", 0)?;

        if max_requests == 0 || window_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "FUNNEL_CHAT_RATE_LIMIT".into(),
                message: "rate limit and window must be non-zero".into(),
            });
        }

        Ok(Self {
            host,
            port,
            allowed_origins,
            environment,
            session: SessionConfig {
                max_age: span("FUNNEL_SESSION_MAX_AGE_HOURS", max_age_hours, 3600)?,
                sweep_interval: Duration::from_secs(sweep_secs.max(1)),
            },
            history_retention: span("FUNNEL_HISTORY_RETENTION_DAYS", retention_days, 24 * 3600)?,
            rate_limit: RateLimitConfig {
                max_requests,
                window: Duration::from_secs(window_secs),
            },
            email_from,
            trusted_proxies,
        })
    }

    /// `host:port` string for binding the listener.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// `count` units of `unit_secs` seconds, rejecting spans that overflow.
fn span(key: &str, count: u64, unit_secs: u64) -> Result<Duration, ConfigError> {
    count
        .checked_mul(unit_secs)
        .map(Duration::from_secs)
        .filter(|d| chrono::Duration::from_std(*d).is_ok())
        .ok_or_else(|| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("{count} is too large"),
        })
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_env_empty() {
        let config = FunnelConfig::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config.port, 5000);
        assert_eq!(config.allowed_origins, vec!["http://localhost:3000"]);
        assert_eq!(config.environment, Environment::Development);
        assert_eq!(config.session.max_age, Duration::from_secs(86_400));
        assert_eq!(config.rate_limit.max_requests, 100);
    }

    #[test]
    fn parses_origins_and_port() {
        let config = FunnelConfig::from_lookup(lookup_from(&[
            ("PORT", "8081"),
            ("ALLOWED_ORIGINS", "https://a.example, https://b.example ,"),
            ("NODE_ENV", "production"),
        ]))
        .unwrap();
        assert_eq!(config.port, 8081);
        assert_eq!(
            config.allowed_origins,
            vec!["https://a.example", "https://b.example"]
        );
        assert_eq!(config.environment, Environment::Production);
        assert_eq!(config.bind_addr(), "0.0.0.0:8081");
    }

    #[test]
    fn funnel_env_overrides_node_env() {
        let config = FunnelConfig::from_lookup(lookup_from(&[
            ("NODE_ENV", "production"),
            ("FUNNEL_ENV", "development"),
        ]))
        .unwrap();
        assert!(config.environment.is_development());
    }

    #[test]
    fn invalid_port_is_an_error() {
        let err = FunnelConfig::from_lookup(lookup_from(&[("PORT", "eighty")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "PORT"));
    }

    #[test]
    fn oversized_durations_are_errors() {
        let err = FunnelConfig::from_lookup(lookup_from(&[(
            "FUNNEL_SESSION_MAX_AGE_HOURS",
            "18446744073709551615",
        )]))
        .unwrap_err();
        assert!(
            matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "FUNNEL_SESSION_MAX_AGE_HOURS")
        );

        let err = FunnelConfig::from_lookup(lookup_from(&[(
            "FUNNEL_HISTORY_RETENTION_DAYS",
            "1000000000000000",
        )]))
        .unwrap_err();
        assert!(
            matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "FUNNEL_HISTORY_RETENTION_DAYS")
        );
    }

    #[test]
    fn trusted_proxies_default_to_none() {
        let config = FunnelConfig::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config.trusted_proxies, 0);
        let config =
            FunnelConfig::from_lookup(lookup_from(&[("FUNNEL_TRUSTED_PROXIES", "1")])).unwrap();
        assert_eq!(config.trusted_proxies, 1);
    }

    #[test]
    fn zero_rate_limit_rejected() {
        let err = FunnelConfig::from_lookup(lookup_from(&[("FUNNEL_CHAT_RATE_LIMIT", "0")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }
}
