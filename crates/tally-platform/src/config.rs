use anyhow::{Context, Result};

const MIN_TOKEN_SECRET_BYTES: usize = 32;
const MAX_TOKEN_TTL_HOURS: i64 = 24 * 366;

#[derive(Clone, Debug)]
pub struct ServiceConfig {
    pub database_url: String,
    pub http_addr: String,
    pub token_secret: String,
    pub token_ttl_hours: i64,
    pub max_connections: u32,
    pub run_migrations: bool,
}

impl ServiceConfig {
    pub fn from_env(default_http_addr: &str) -> Result<Self> {
        Self::from_lookup(default_http_addr, |key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(default_http_addr: &str, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL").context("DATABASE_URL is required")?;
        let http_addr = lookup("HTTP_ADDR").unwrap_or_else(|| default_http_addr.to_string());

        let token_secret =
            lookup("TALLY_TOKEN_SECRET").context("TALLY_TOKEN_SECRET is required")?;
        if token_secret.len() < MIN_TOKEN_SECRET_BYTES {
            anyhow::bail!("TALLY_TOKEN_SECRET must be at least {MIN_TOKEN_SECRET_BYTES} bytes");
        }

        let token_ttl_hours = match lookup("TALLY_TOKEN_TTL_HOURS") {
            Some(value) => value
                .trim()
                .parse::<i64>()
                .context("TALLY_TOKEN_TTL_HOURS must be an integer")?,
            None => 24,
        };
        if !(1..=MAX_TOKEN_TTL_HOURS).contains(&token_ttl_hours) {
            anyhow::bail!("TALLY_TOKEN_TTL_HOURS must be between 1 and {MAX_TOKEN_TTL_HOURS}");
        }

        let max_connections = match lookup("DATABASE_MAX_CONNECTIONS") {
            Some(value) => value
                .trim()
                .parse::<u32>()
                .context("DATABASE_MAX_CONNECTIONS must be a positive integer")?,
            None => 10,
        };

        let run_migrations = match lookup("TALLY_RUN_MIGRATIONS") {
            Some(value) => parse_flag(&value).context("TALLY_RUN_MIGRATIONS must be true or false")?,
            None => true,
        };

        Ok(Self {
            database_url,
            http_addr,
            token_secret,
            token_ttl_hours,
            max_connections,
            run_migrations,
        })
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    fn config(vars: &[(&str, &str)]) -> Result<ServiceConfig> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        ServiceConfig::from_lookup("0.0.0.0:8080", |key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_optional_vars_are_unset() {
        let config = config(&[
            ("DATABASE_URL", "postgres://localhost/tally"),
            ("TALLY_TOKEN_SECRET", SECRET),
        ])
        .unwrap();

        assert_eq!(config.http_addr, "0.0.0.0:8080");
        assert_eq!(config.token_ttl_hours, 24);
        assert_eq!(config.max_connections, 10);
        assert!(config.run_migrations);
    }

    #[test]
    fn short_or_missing_secret_is_rejected() {
        let missing = config(&[("DATABASE_URL", "postgres://localhost/tally")]).unwrap_err();
        assert!(missing.to_string().contains("TALLY_TOKEN_SECRET"));

        let short = config(&[
            ("DATABASE_URL", "postgres://localhost/tally"),
            ("TALLY_TOKEN_SECRET", "too-short"),
        ])
        .unwrap_err();
        assert!(short.to_string().contains("at least 32 bytes"));
    }

    #[test]
    fn token_lifetime_is_bounded() {
        for ttl in ["0", "-3", "8785", "9223372036854775807"] {
            let err = config(&[
                ("DATABASE_URL", "postgres://localhost/tally"),
                ("TALLY_TOKEN_SECRET", SECRET),
                ("TALLY_TOKEN_TTL_HOURS", ttl),
            ])
            .unwrap_err();
            assert!(err.to_string().contains("between 1 and 8784"), "{ttl}");
        }

        let year = config(&[
            ("DATABASE_URL", "postgres://localhost/tally"),
            ("TALLY_TOKEN_SECRET", SECRET),
            ("TALLY_TOKEN_TTL_HOURS", "8784"),
        ])
        .unwrap();
        assert_eq!(year.token_ttl_hours, 8784);
    }

    #[test]
    fn overrides_are_parsed() {
        let config = config(&[
            ("DATABASE_URL", "postgres://localhost/tally"),
            ("TALLY_TOKEN_SECRET", SECRET),
            ("HTTP_ADDR", "127.0.0.1:9000"),
            ("TALLY_TOKEN_TTL_HOURS", "2"),
            ("DATABASE_MAX_CONNECTIONS", "4"),
            ("TALLY_RUN_MIGRATIONS", "off"),
        ])
        .unwrap();

        assert_eq!(config.http_addr, "127.0.0.1:9000");
        assert_eq!(config.token_ttl_hours, 2);
        assert_eq!(config.max_connections, 4);
        assert!(!config.run_migrations);
    }
}
