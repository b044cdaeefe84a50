//! Configuration for the ClassVibes client

use std::path::PathBuf;
use std::time::Duration;
use url::Url;

use crate::error::{Error, Result};

/// Connection settings for the remote data service.
#[derive(Debug, Clone)]
pub struct Config {
    pub url: Url,
    pub anon_key: String,
    pub options: ClientOptions,
}

impl Config {
    /// Creates a new configuration, validating the URL.
    pub fn new(url_str: &str, anon_key: String) -> Result<Self> {
        let url = Url::parse(url_str).map_err(|e| Error::config(format!("invalid URL: {}", e)))?;
        if anon_key.trim().is_empty() {
            return Err(Error::config("anon_key cannot be empty"));
        }
        Ok(Self {
            url,
            anon_key,
            options: ClientOptions::default(),
        })
    }

    /// Reads `CLASSVIBES_URL` / `CLASSVIBES_ANON_KEY`, falling back to the
    /// `SUPABASE_*` names.
    pub fn from_env() -> Result<Self> {
        let url_str = env_any(&["CLASSVIBES_URL", "SUPABASE_URL"])
            .ok_or_else(|| Error::config("CLASSVIBES_URL environment variable not found"))?;
        let anon_key = env_any(&["CLASSVIBES_ANON_KEY", "SUPABASE_ANON_KEY"]).ok_or_else(|| {
            Error::config("CLASSVIBES_ANON_KEY environment variable not found")
        })?;
        Self::new(&url_str, anon_key)
    }

    pub fn with_options(mut self, options: ClientOptions) -> Self {
        self.options = options;
        self
    }

    /// Base URL without the trailing slash `Url` adds.
    pub fn base_url(&self) -> &str {
        self.url.as_str().trim_end_matches('/')
    }
}

fn env_any(keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| std::env::var(key).ok())
        .find(|value| !value.trim().is_empty())
}

/// Tunables for the client
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Timeout applied to every remote call
    pub request_timeout: Option<Duration>,

    /// Simulated processing time of the payment confirmation step
    pub payment_delay: Duration,

    /// File the session is persisted to, if any
    pub session_path: Option<PathBuf>,

    /// File the onboarding saga log is kept in, if any
    pub saga_log_path: Option<PathBuf>,

    /// Profile name assigned to onboarded teachers
    pub teacher_role_name: String,

    /// Username candidates tried before onboarding gives up
    pub max_username_attempts: u32,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            request_timeout: Some(Duration::from_secs(30)),
            payment_delay: Duration::from_millis(1500),
            session_path: None,
            saga_log_path: None,
            teacher_role_name: "profesor".to_string(),
            max_username_attempts: 100,
        }
    }
}

impl ClientOptions {
    /// Set the request timeout
    pub fn with_request_timeout(mut self, value: Option<Duration>) -> Self {
        self.request_timeout = value;
        self
    }

    /// Set the simulated payment delay
    pub fn with_payment_delay(mut self, value: Duration) -> Self {
        self.payment_delay = value;
        self
    }

    /// Persist the session to `path`
    pub fn with_session_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.session_path = Some(path.into());
        self
    }

    /// Keep the saga log in `path`
    pub fn with_saga_log_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.saga_log_path = Some(path.into());
        self
    }

    /// Set the profile name given to new teachers
    pub fn with_teacher_role_name(mut self, value: &str) -> Self {
        self.teacher_role_name = value.to_string();
        self
    }

    /// Set the maximum number of username candidates
    pub fn with_max_username_attempts(mut self, value: u32) -> Self {
        self.max_username_attempts = value;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_new_valid() {
        let config = Config::new("http://localhost:54321", "anon".to_string()).unwrap();
        assert_eq!(config.url.to_string(), "http://localhost:54321/");
        assert_eq!(config.base_url(), "http://localhost:54321");
        assert_eq!(config.options.teacher_role_name, "profesor");
    }

    #[test]
    fn config_new_invalid_url() {
        let config = Config::new("not a valid url", "anon".to_string());
        match config {
            Err(Error::Config(msg)) => assert!(msg.contains("invalid URL")),
            other => panic!("Expected Config error, got {:?}", other),
        }
    }

    #[test]
    fn config_new_empty_key() {
        let config = Config::new("http://localhost:54321", "  ".to_string());
        match config {
            Err(Error::Config(msg)) => assert!(msg.contains("anon_key cannot be empty")),
            other => panic!("Expected Config error for empty key, got {:?}", other),
        }
    }

    #[test]
    fn options_builder() {
        let options = ClientOptions::default()
            .with_payment_delay(Duration::ZERO)
            .with_max_username_attempts(3)
            .with_session_path("/tmp/session.json");
        assert_eq!(options.payment_delay, Duration::ZERO);
        assert_eq!(options.max_username_attempts, 3);
        assert!(options.session_path.is_some());
        assert_eq!(options.request_timeout, Some(Duration::from_secs(30)));
    }
}
