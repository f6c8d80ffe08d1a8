//! Analysis configuration.

use std::time::Duration;

use crate::error::{ProbeError, Result};
use crate::logging::LogConfig;

/// Default number of records sampled per container for structure analysis.
pub const DEFAULT_SAMPLE_SIZE: usize = 10;
/// Default number of sampled records retained in a structure report.
pub const DEFAULT_RETAINED_SAMPLES: usize = 3;

/// Collection and field names used by the hotel/booking business procedure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusinessVocabulary {
    pub hotels_collection: String,
    pub bookings_collection: String,
    pub rating_field: String,
    pub price_field: String,
    pub status_field: String,
    pub amount_field: String,
    pub confirmed_status: String,
    pub cancelled_status: String,
}

impl Default for BusinessVocabulary {
    fn default() -> Self {
        Self {
            hotels_collection: "hotels".to_string(),
            bookings_collection: "bookings".to_string(),
            rating_field: "rating".to_string(),
            price_field: "price".to_string(),
            status_field: "status".to_string(),
            amount_field: "total_amount".to_string(),
            confirmed_status: "confirmed".to_string(),
            cancelled_status: "cancelled".to_string(),
        }
    }
}

/// Configuration shared by every analysis procedure.
///
/// Built with `with_*` setters over [`AnalysisConfig::default`] or read from
/// `TERM_PROBE_*` environment variables with [`AnalysisConfig::from_env`].
///
/// ```rust
/// use std::time::Duration;
/// use term_probe::config::AnalysisConfig;
///
/// let config = AnalysisConfig::default()
///     .with_sample_size(25)
///     .with_category_timeout(Duration::from_secs(30));
/// assert_eq!(config.sample_size(), 25);
/// ```
#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    sample_size: usize,
    retained_samples: usize,
    quality_fields: Vec<String>,
    domain_fields: Vec<String>,
    business: BusinessVocabulary,
    category_timeout: Option<Duration>,
    connect_timeout: Option<Duration>,
    log: LogConfig,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            sample_size: DEFAULT_SAMPLE_SIZE,
            retained_samples: DEFAULT_RETAINED_SAMPLES,
            quality_fields: ["name", "address", "rating", "price"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            domain_fields: [
                "name",
                "address",
                "city",
                "country",
                "rating",
                "price",
                "amenities",
                "hotel_id",
                "customer_id",
                "check_in",
                "check_out",
                "guests",
                "status",
                "total_amount",
                "email",
                "phone",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            business: BusinessVocabulary::default(),
            category_timeout: None,
            connect_timeout: None,
            log: LogConfig::default(),
        }
    }
}

impl AnalysisConfig {
    /// Reads overrides from the environment on top of the defaults.
    ///
    /// Recognized variables: `TERM_PROBE_SAMPLE_SIZE`,
    /// `TERM_PROBE_CATEGORY_TIMEOUT_MS`, `TERM_PROBE_CONNECT_TIMEOUT_MS` and
    /// `TERM_PROBE_QUALITY_FIELDS` (comma separated).
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(raw) = lookup("TERM_PROBE_SAMPLE_SIZE") {
            let size = parse_number("TERM_PROBE_SAMPLE_SIZE", &raw)?;
            if size == 0 {
                return Err(ProbeError::Configuration(
                    "TERM_PROBE_SAMPLE_SIZE must be greater than zero".to_string(),
                ));
            }
            config.sample_size = size as usize;
        }
        if let Some(raw) = lookup("TERM_PROBE_CATEGORY_TIMEOUT_MS") {
            let ms = parse_number("TERM_PROBE_CATEGORY_TIMEOUT_MS", &raw)?;
            config.category_timeout = Some(Duration::from_millis(ms));
        }
        if let Some(raw) = lookup("TERM_PROBE_CONNECT_TIMEOUT_MS") {
            let ms = parse_number("TERM_PROBE_CONNECT_TIMEOUT_MS", &raw)?;
            config.connect_timeout = Some(Duration::from_millis(ms));
        }
        if let Some(raw) = lookup("TERM_PROBE_QUALITY_FIELDS") {
            let fields: Vec<String> = raw
                .split(',')
                .map(str::trim)
                .filter(|f| !f.is_empty())
                .map(String::from)
                .collect();
            if !fields.is_empty() {
                config.quality_fields = fields;
            }
        }

        Ok(config)
    }

    /// Sets the number of records sampled per container.
    pub fn with_sample_size(mut self, sample_size: usize) -> Self {
        self.sample_size = sample_size.max(1);
        self
    }

    /// Sets how many sampled records are kept in the structure report.
    pub fn with_retained_samples(mut self, retained: usize) -> Self {
        self.retained_samples = retained;
        self
    }

    /// Sets the expected fields checked by the quality procedure.
    pub fn with_quality_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.quality_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the domain field vocabulary.
    pub fn with_domain_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.domain_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the business collection and field names.
    pub fn with_business_vocabulary(mut self, business: BusinessVocabulary) -> Self {
        self.business = business;
        self
    }

    /// Bounds each analysis category's running time.
    pub fn with_category_timeout(mut self, timeout: Duration) -> Self {
        self.category_timeout = Some(timeout);
        self
    }

    /// Bounds the time spent establishing a connection.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Sets the logging configuration.
    pub fn with_log_config(mut self, log: LogConfig) -> Self {
        self.log = log;
        self
    }

    pub fn sample_size(&self) -> usize {
        self.sample_size
    }

    pub fn retained_samples(&self) -> usize {
        self.retained_samples
    }

    pub fn quality_fields(&self) -> &[String] {
        &self.quality_fields
    }

    pub fn domain_fields(&self) -> &[String] {
        &self.domain_fields
    }

    pub fn business(&self) -> &BusinessVocabulary {
        &self.business
    }

    pub fn category_timeout(&self) -> Option<Duration> {
        self.category_timeout
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout
    }

    pub fn log(&self) -> &LogConfig {
        &self.log
    }
}

fn parse_number(key: &str, raw: &str) -> Result<u64> {
    raw.trim()
        .parse::<u64>()
        .map_err(|e| ProbeError::Configuration(format!("{key}={raw:?} is not a number: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = AnalysisConfig::default();
        assert_eq!(config.sample_size(), 10);
        assert_eq!(config.retained_samples(), 3);
        assert_eq!(
            config.quality_fields(),
            &["name", "address", "rating", "price"]
        );
        assert_eq!(config.business().bookings_collection, "bookings");
        assert!(config.category_timeout().is_none());
    }

    #[test]
    fn test_builder() {
        let config = AnalysisConfig::default()
            .with_sample_size(0)
            .with_quality_fields(["title"])
            .with_connect_timeout(Duration::from_millis(250));
        assert_eq!(config.sample_size(), 1);
        assert_eq!(config.quality_fields(), &["title"]);
        assert_eq!(config.connect_timeout(), Some(Duration::from_millis(250)));
    }

    #[test]
    fn test_from_lookup() {
        let env: HashMap<&str, &str> = [
            ("TERM_PROBE_SAMPLE_SIZE", "50"),
            ("TERM_PROBE_CATEGORY_TIMEOUT_MS", "1500"),
            ("TERM_PROBE_QUALITY_FIELDS", "name, email ,"),
        ]
        .into_iter()
        .collect();

        let config =
            AnalysisConfig::from_lookup(|k| env.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(config.sample_size(), 50);
        assert_eq!(config.category_timeout(), Some(Duration::from_millis(1500)));
        assert_eq!(config.quality_fields(), &["name", "email"]);
        assert!(config.connect_timeout().is_none());
    }

    #[test]
    fn test_from_lookup_rejects_garbage() {
        let err = AnalysisConfig::from_lookup(|k| {
            (k == "TERM_PROBE_SAMPLE_SIZE").then(|| "ten".to_string())
        })
        .unwrap_err();
        assert!(matches!(err, ProbeError::Configuration(_)));

        let err = AnalysisConfig::from_lookup(|k| {
            (k == "TERM_PROBE_SAMPLE_SIZE").then(|| "0".to_string())
        })
        .unwrap_err();
        assert!(matches!(err, ProbeError::Configuration(_)));
    }
}
