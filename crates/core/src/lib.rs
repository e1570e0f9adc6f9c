pub mod backfill;
pub mod dataset;
pub mod error;
pub mod ingest;
pub mod time;

pub mod config {
    use crate::error::IngestError;
    use std::path::PathBuf;
    use std::time::Duration;

    const DEFAULT_LOCATION: &str = "barcelona";
    const DEFAULT_BASE_URL: &str = "https://api.waqi.info";
    const DEFAULT_DATA_DIR: &str = "data";
    const DEFAULT_TIMEOUT_SECS: u64 = 30;
    const DEFAULT_RETRIES: u32 = 1;
    const MAX_RETRIES: u32 = 10;

    #[derive(Debug, Clone)]
    pub struct Settings {
        pub api_token: Option<String>,
        pub location: String,
        pub base_url: String,
        pub data_dir: PathBuf,
        pub timeout: Duration,
        pub retries: u32,
        pub request_delay: Duration,
        pub sentry_dsn: Option<String>,
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            Self::from_lookup(|key| std::env::var(key).ok())
        }

        pub(crate) fn from_lookup(get: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
            let non_blank = |key: &str| get(key).filter(|s| !s.trim().is_empty());

            let timeout_secs = parse_or(non_blank("AQI_TIMEOUT_SECS"), DEFAULT_TIMEOUT_SECS, "AQI_TIMEOUT_SECS")?;
            let retries = parse_or(non_blank("AQI_RETRIES"), DEFAULT_RETRIES, "AQI_RETRIES")?;
            let delay_ms = parse_or(non_blank("AQI_REQ_DELAY_MS"), 0u64, "AQI_REQ_DELAY_MS")?;

            anyhow::ensure!(
                (1..=MAX_RETRIES).contains(&retries),
                "AQI_RETRIES must be 1..={MAX_RETRIES} (got {retries})"
            );

            Ok(Self {
                api_token: non_blank("AQICN_API_TOKEN"),
                location: non_blank("AQI_LOCATION").unwrap_or_else(|| DEFAULT_LOCATION.to_string()),
                base_url: non_blank("AQI_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
                data_dir: non_blank("AQI_DATA_DIR")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR)),
                timeout: Duration::from_secs(timeout_secs),
                retries,
                request_delay: Duration::from_millis(delay_ms),
                sentry_dsn: non_blank("SENTRY_DSN"),
            })
        }

        /// The feed credential. Missing or blank is fatal and must be checked
        /// before the first fetch.
        pub fn require_api_token(&self) -> Result<&str, IngestError> {
            self.api_token
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .ok_or(IngestError::CredentialMissing)
        }
    }

    fn parse_or<T: std::str::FromStr>(raw: Option<String>, default: T, key: &str) -> anyhow::Result<T> {
        match raw {
            Some(s) => s
                .trim()
                .parse::<T>()
                .map_err(|_| anyhow::anyhow!("{key} is not a valid number: {s}")),
            None => Ok(default),
        }
    }

}
