use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::Endpoint;
use crate::error::HarvestError;

pub const DEFAULT_CONFIG_FILE: &str = "esg-harvester.json";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub indicators_base_url: Option<String>,
    #[serde(default)]
    pub ratings_base_url: Option<String>,
    #[serde(default)]
    pub factsheet_base_url: Option<String>,
    #[serde(default)]
    pub request_delay_ms: Option<u64>,
    #[serde(default)]
    pub retry_attempts: Option<usize>,
    #[serde(default)]
    pub retry_delay_ms: Option<u64>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub test_companies: Option<usize>,
    #[serde(default)]
    pub progress_every: Option<usize>,
    #[serde(default)]
    pub output_dir: Option<String>,
    #[serde(default)]
    pub csv_output_dir: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointUrls {
    pub indicators_base: String,
    pub ratings_base: String,
    pub factsheet_base: String,
}

impl EndpointUrls {
    pub fn endpoint_url(&self, key: &str, endpoint: Endpoint) -> String {
        if endpoint.is_indicator_block() {
            format!("{}/{}/{}", self.indicators_base, key, endpoint)
        } else {
            format!("{}/{}", self.ratings_base, key)
        }
    }

    pub fn factsheet_url(&self, key: &str) -> String {
        format!("{}/{}/fs_icb_block", self.factsheet_base, key)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestPolicy {
    /// Politeness delay charged once after every transport call.
    pub request_delay: Duration,
    /// Retries after the first attempt.
    pub retry_attempts: usize,
    pub retry_delay: Duration,
    pub timeout: Duration,
}

impl Default for RequestPolicy {
    fn default() -> Self {
        Self {
            request_delay: Duration::from_millis(500),
            retry_attempts: 2,
            retry_delay: Duration::from_secs(1),
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HarvestConfig {
    pub urls: EndpointUrls,
    pub policy: RequestPolicy,
    pub test_companies: usize,
    pub progress_every: usize,
    pub output_dir: PathBuf,
    pub csv_output_dir: PathBuf,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        ConfigLoader::resolve_config(Config::default())
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// An explicit path must exist; without one, `esg-harvester.json` in the
    /// working directory is used when present and defaults otherwise.
    pub fn resolve(path: Option<&str>) -> Result<HarvestConfig, HarvestError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if !config_path.exists() {
            if path.is_some() {
                return Err(HarvestError::MissingConfig(config_path));
            }
            return Ok(Self::resolve_config(Config::default()));
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| HarvestError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| HarvestError::ConfigParse(err.to_string()))?;

        Ok(Self::resolve_config(config))
    }

    pub fn resolve_config(config: Config) -> HarvestConfig {
        let defaults = RequestPolicy::default();
        let policy = RequestPolicy {
            request_delay: config
                .request_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.request_delay),
            retry_attempts: config.retry_attempts.unwrap_or(defaults.retry_attempts),
            retry_delay: config
                .retry_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.retry_delay),
            timeout: config
                .timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
        };

        let urls = EndpointUrls {
            indicators_base: trim_base(config.indicators_base_url.unwrap_or_else(|| {
                "https://live.euronext.com/en/ajax/getEsgIndicatorsBlock".to_string()
            })),
            ratings_base: trim_base(config.ratings_base_url.unwrap_or_else(|| {
                "https://live.euronext.com/en/ajax/getEsgRatingsBlock".to_string()
            })),
            factsheet_base: trim_base(config.factsheet_base_url.unwrap_or_else(|| {
                "https://live.euronext.com/en/ajax/getFactsheetInfoBlock/STOCK".to_string()
            })),
        };

        HarvestConfig {
            urls,
            policy,
            test_companies: config.test_companies.unwrap_or(5),
            progress_every: config.progress_every.unwrap_or(50).max(1),
            output_dir: PathBuf::from(config.output_dir.unwrap_or_else(|| "output".to_string())),
            csv_output_dir: PathBuf::from(
                config
                    .csv_output_dir
                    .unwrap_or_else(|| "csv_output".to_string()),
            ),
        }
    }
}

fn trim_base(url: String) -> String {
    url.trim_end_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_site_etiquette() {
        let config = ConfigLoader::resolve_config(Config::default());
        assert_eq!(config.policy.retry_attempts, 2);
        assert_eq!(config.policy.request_delay, Duration::from_millis(500));
        assert_eq!(config.policy.retry_delay, Duration::from_secs(1));
        assert_eq!(config.policy.timeout, Duration::from_secs(30));
        assert_eq!(config.test_companies, 5);
        assert_eq!(config.progress_every, 50);
        assert!(config.urls.ratings_base.ends_with("getEsgRatingsBlock"));
    }

    #[test]
    fn overrides_strip_trailing_slash() {
        let config = ConfigLoader::resolve_config(Config {
            indicators_base_url: Some("http://localhost:8080/indicators/".to_string()),
            retry_attempts: Some(0),
            progress_every: Some(0),
            ..Config::default()
        });
        assert_eq!(config.urls.indicators_base, "http://localhost:8080/indicators");
        assert_eq!(config.policy.retry_attempts, 0);
        assert_eq!(config.progress_every, 1);
    }

    #[test]
    fn endpoint_urls_follow_block_shape() {
        let urls = ConfigLoader::resolve_config(Config::default()).urls;
        assert_eq!(
            urls.endpoint_url("FR0000120073-XPAR", Endpoint::SocialGovernanceIndicators),
            "https://live.euronext.com/en/ajax/getEsgIndicatorsBlock/FR0000120073-XPAR/esg_social_governance_indicators"
        );
        assert_eq!(
            urls.endpoint_url("FR0000120073-XPAR", Endpoint::Ratings),
            "https://live.euronext.com/en/ajax/getEsgRatingsBlock/FR0000120073-XPAR"
        );
        assert_eq!(
            urls.factsheet_url("FR0000120073-XPAR"),
            "https://live.euronext.com/en/ajax/getFactsheetInfoBlock/STOCK/FR0000120073-XPAR/fs_icb_block"
        );
    }
}
