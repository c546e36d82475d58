use std::time::Duration;

use serde::Deserialize;

use crate::Error;

/// Configures retry bounds, backoff window and per-attempt timeout.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(default)]
pub struct ClientOptions {
    /// Per-attempt timeout in milliseconds. `0` disables it.
    pub timeout_ms: u64,
    /// Maximum number of retries after the initial attempt.
    pub max_retries: usize,
    /// Shortest wait between attempts, in milliseconds.
    pub retry_wait_min_ms: u64,
    /// Longest wait between attempts, in milliseconds.
    pub retry_wait_max_ms: u64,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            max_retries: 4,
            retry_wait_min_ms: 1_000,
            retry_wait_max_ms: 30_000,
        }
    }
}

impl ClientOptions {
    pub fn retry_wait_min(&self) -> Duration {
        Duration::from_millis(self.retry_wait_min_ms)
    }

    pub fn retry_wait_max(&self) -> Duration {
        Duration::from_millis(self.retry_wait_max_ms)
    }

    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_ms > 0).then(|| Duration::from_millis(self.timeout_ms))
    }

    /// Checks that the backoff window is well formed.
    pub fn validate(&self) -> Result<(), Error> {
        if self.retry_wait_min_ms > self.retry_wait_max_ms {
            return Err(Error::Config(format!(
                "retry_wait_min_ms ({}) exceeds retry_wait_max_ms ({})",
                self.retry_wait_min_ms, self.retry_wait_max_ms
            )));
        }
        Ok(())
    }

    /// Reads options from environment variables, keeping defaults for unset
    /// ones.
    ///
    /// Reads:
    /// - `RESILIENT_HTTP_TIMEOUT_MS`
    /// - `RESILIENT_HTTP_MAX_RETRIES`
    /// - `RESILIENT_HTTP_RETRY_WAIT_MIN_MS`
    /// - `RESILIENT_HTTP_RETRY_WAIT_MAX_MS`
    ///
    /// Returns an error if a variable is set but not a non-negative integer,
    /// or if the resulting options fail [`ClientOptions::validate`].
    pub fn from_env() -> Result<Self, Error> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, Error> {
        let mut options = Self::default();
        if let Some(value) = read_var(&lookup, "RESILIENT_HTTP_TIMEOUT_MS")? {
            options.timeout_ms = value;
        }
        if let Some(value) = read_var(&lookup, "RESILIENT_HTTP_MAX_RETRIES")? {
            options.max_retries = usize::try_from(value).map_err(|_| {
                Error::Config(format!("RESILIENT_HTTP_MAX_RETRIES is too large: {value}"))
            })?;
        }
        if let Some(value) = read_var(&lookup, "RESILIENT_HTTP_RETRY_WAIT_MIN_MS")? {
            options.retry_wait_min_ms = value;
        }
        if let Some(value) = read_var(&lookup, "RESILIENT_HTTP_RETRY_WAIT_MAX_MS")? {
            options.retry_wait_max_ms = value;
        }
        options.validate()?;
        Ok(options)
    }
}

fn read_var(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<u64>, Error> {
    let Some(raw) = lookup(key) else {
        return Ok(None);
    };
    raw.trim()
        .parse::<u64>()
        .map(Some)
        .map_err(|_| Error::Config(format!("{key} must be a non-negative integer, got '{raw}'")))
}

#[cfg(test)]
mod tests {
    use std::{collections::HashMap, time::Duration};

    use super::ClientOptions;
    use crate::Error;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| ((*key).to_owned(), (*value).to_owned()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults_match_documented_values() {
        let options = ClientOptions::default();
        assert_eq!(options.retry_wait_min(), Duration::from_secs(1));
        assert_eq!(options.retry_wait_max(), Duration::from_secs(30));
        assert_eq!(options.max_retries, 4);
        assert_eq!(options.timeout(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn zero_timeout_disables_it() {
        let options = ClientOptions {
            timeout_ms: 0,
            ..ClientOptions::default()
        };
        assert_eq!(options.timeout(), None);
    }

    #[test]
    fn env_overrides_selected_fields() {
        let options = ClientOptions::from_lookup(lookup(&[
            ("RESILIENT_HTTP_MAX_RETRIES", "7"),
            ("RESILIENT_HTTP_RETRY_WAIT_MIN_MS", " 250 "),
        ]))
        .expect("options must parse");
        assert_eq!(options.max_retries, 7);
        assert_eq!(options.retry_wait_min_ms, 250);
        assert_eq!(options.retry_wait_max_ms, 30_000);
    }

    #[test]
    fn env_rejects_garbage_and_inverted_window() {
        let err = ClientOptions::from_lookup(lookup(&[("RESILIENT_HTTP_MAX_RETRIES", "many")]))
            .expect_err("non-numeric value must fail");
        assert!(matches!(err, Error::Config(_)));

        let err = ClientOptions::from_lookup(lookup(&[
            ("RESILIENT_HTTP_RETRY_WAIT_MIN_MS", "5000"),
            ("RESILIENT_HTTP_RETRY_WAIT_MAX_MS", "100"),
        ]))
        .expect_err("inverted window must fail");
        assert!(err.to_string().contains("exceeds"));
    }

    #[test]
    fn deserializes_partial_config() {
        let options: ClientOptions =
            serde_json::from_str(r#"{ "max_retries": 2, "retry_wait_max_ms": 5000 }"#).unwrap();
        assert_eq!(options.max_retries, 2);
        assert_eq!(options.retry_wait_max_ms, 5_000);
        assert_eq!(options.retry_wait_min_ms, 1_000);
    }
}
