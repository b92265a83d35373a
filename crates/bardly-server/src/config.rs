use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};

use bardly_api::quota::DEFAULT_FREE_TOKEN_LIMIT;
use bardly_llm::DEFAULT_BASE_URL;

/// Placeholder JWT secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-secret-change-me",
];

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub openai_api_key: String,
    pub llm_base_url: String,
    pub llm_model: String,
    pub free_token_limit: i64,
    pub billing_secret: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let jwt_secret = get("BARDLY_JWT_SECRET").unwrap_or_default();
        if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            bail!("BARDLY_JWT_SECRET is unset or still a placeholder");
        }

        let Some(openai_api_key) = get("OPENAI_API_KEY") else {
            bail!("OPENAI_API_KEY is not set");
        };

        let port = match get("BARDLY_PORT") {
            Some(v) => v.parse().with_context(|| format!("invalid BARDLY_PORT: {}", v))?,
            None => 3000,
        };

        let free_token_limit = match get("BARDLY_FREE_TOKEN_LIMIT") {
            Some(v) => v
                .parse()
                .with_context(|| format!("invalid BARDLY_FREE_TOKEN_LIMIT: {}", v))?,
            None => DEFAULT_FREE_TOKEN_LIMIT,
        };
        if free_token_limit < 0 {
            bail!("BARDLY_FREE_TOKEN_LIMIT must not be negative");
        }

        Ok(Self {
            host: get("BARDLY_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port,
            db_path: get("BARDLY_DB_PATH").unwrap_or_else(|| "bardly.db".into()).into(),
            jwt_secret,
            openai_api_key,
            llm_base_url: get("BARDLY_LLM_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.into()),
            llm_model: get("BARDLY_LLM_MODEL").unwrap_or_else(|| "gpt-4o-mini".into()),
            free_token_limit,
            billing_secret: get("BARDLY_BILLING_SECRET"),
        })
    }

    pub fn addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("invalid listen address {}:{}", self.host, self.port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    const REQUIRED: &[(&str, &str)] = &[
        ("BARDLY_JWT_SECRET", "a-real-secret"),
        ("OPENAI_API_KEY", "sk-test"),
    ];

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(REQUIRED)).unwrap();
        assert_eq!(config.port, 3000);
        assert_eq!(config.db_path, PathBuf::from("bardly.db"));
        assert_eq!(config.llm_base_url, DEFAULT_BASE_URL);
        assert_eq!(config.llm_model, "gpt-4o-mini");
        assert_eq!(config.free_token_limit, 100_000);
        assert!(config.billing_secret.is_none());
        assert_eq!(config.addr().unwrap().to_string(), "0.0.0.0:3000");
    }

    #[test]
    fn test_overrides() {
        let mut pairs = REQUIRED.to_vec();
        pairs.extend([
            ("BARDLY_PORT", "8080"),
            ("BARDLY_FREE_TOKEN_LIMIT", "500"),
            ("BARDLY_BILLING_SECRET", "hook"),
            ("BARDLY_LLM_MODEL", "gpt-4o"),
        ]);
        let config = Config::from_lookup(lookup(&pairs)).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.free_token_limit, 500);
        assert_eq!(config.billing_secret.as_deref(), Some("hook"));
        assert_eq!(config.llm_model, "gpt-4o");
    }

    #[test]
    fn test_rejects_placeholder_secret() {
        let pairs = [
            ("BARDLY_JWT_SECRET", "dev-secret-change-me"),
            ("OPENAI_API_KEY", "sk-test"),
        ];
        assert!(Config::from_lookup(lookup(&pairs)).is_err());
    }

    #[test]
    fn test_requires_api_key() {
        let pairs = [("BARDLY_JWT_SECRET", "a-real-secret"), ("OPENAI_API_KEY", "  ")];
        assert!(Config::from_lookup(lookup(&pairs)).is_err());
    }

    #[test]
    fn test_rejects_bad_numbers() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("BARDLY_PORT", "eighty"));
        assert!(Config::from_lookup(lookup(&pairs)).is_err());

        let mut pairs = REQUIRED.to_vec();
        pairs.push(("BARDLY_FREE_TOKEN_LIMIT", "-1"));
        assert!(Config::from_lookup(lookup(&pairs)).is_err());
    }
}
