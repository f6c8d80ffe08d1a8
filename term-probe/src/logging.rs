//! Logging switches and subscriber setup.
//!
//! Every component logs through `tracing`. [`LogConfig`] travels inside
//! [`AnalysisConfig`](crate::config::AnalysisConfig) and controls how chatty
//! the analysis procedures and the insight generator are. It never touches
//! the global subscriber. Binaries and tests that do not install their own
//! subscriber can use [`setup::init_logging`].

/// Per-engine logging switches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// Emit a debug event for every backend read issued by a procedure.
    pub log_data_operations: bool,
    /// Emit an info event summarizing each generated insight bundle.
    pub log_insights: bool,
    /// Longest string kept in sampled records and logged fields.
    pub max_field_length: usize,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            log_data_operations: true,
            log_insights: true,
            max_field_length: 256,
        }
    }
}

impl LogConfig {
    /// Keeps long sampled values intact; useful when inspecting samples.
    pub fn verbose() -> Self {
        Self {
            max_field_length: 1024,
            ..Self::default()
        }
    }

    /// No per-read or per-bundle events.
    pub fn quiet() -> Self {
        Self {
            log_data_operations: false,
            log_insights: false,
            max_field_length: 128,
        }
    }

    pub fn with_data_operations(mut self, enabled: bool) -> Self {
        self.log_data_operations = enabled;
        self
    }

    pub fn with_max_field_length(mut self, max_field_length: usize) -> Self {
        self.max_field_length = max_field_length;
        self
    }
}

/// Logs a backend read at debug level when the given [`LogConfig`] allows it.
///
/// ```rust
/// use term_probe::log_data_op;
/// use term_probe::logging::LogConfig;
///
/// let config = LogConfig::quiet();
/// log_data_op!(config, collection = "hotels", "counting records");
/// ```
#[macro_export]
macro_rules! log_data_op {
    ($config:expr, $($arg:tt)*) => {
        if $config.log_data_operations {
            tracing::debug!($($arg)*);
        }
    };
}

/// Cuts `value` to at most `max_length` bytes, backing off to a character
/// boundary, and marks the cut.
pub fn truncate_field(value: &str, max_length: usize) -> String {
    if value.len() <= max_length {
        return value.to_string();
    }
    let cut = (0..=max_length)
        .rev()
        .find(|&i| value.is_char_boundary(i))
        .unwrap_or(0);
    format!("{}...(truncated)", &value[..cut])
}

/// Global subscriber installation.
pub mod setup {
    use tracing::Level;
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    /// Log targets of the backend client crates.
    pub const DRIVER_TARGETS: [&str; 4] = ["mongodb", "redis", "cdrs_tokio", "elasticsearch"];

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum LogFormat {
        Pretty,
        Compact,
        Json,
    }

    /// Subscriber settings for [`init_logging`].
    #[derive(Debug, Clone)]
    pub struct SubscriberConfig {
        pub format: LogFormat,
        /// Level for everything not named below.
        pub default_level: Level,
        /// Level for `term_probe` targets.
        pub probe_level: Level,
        /// Level for the backend client crates in [`DRIVER_TARGETS`].
        pub driver_level: Level,
        /// Replaces the generated directives entirely.
        pub filter_override: Option<String>,
    }

    impl Default for SubscriberConfig {
        fn default() -> Self {
            Self {
                format: LogFormat::Compact,
                default_level: Level::INFO,
                probe_level: Level::DEBUG,
                driver_level: Level::WARN,
                filter_override: None,
            }
        }
    }

    impl SubscriberConfig {
        /// JSON lines, probe events at info, driver crates at error.
        pub fn production() -> Self {
            Self {
                format: LogFormat::Json,
                default_level: Level::WARN,
                probe_level: Level::INFO,
                driver_level: Level::ERROR,
                filter_override: None,
            }
        }

        pub fn with_format(mut self, format: LogFormat) -> Self {
            self.format = format;
            self
        }

        pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
            self.filter_override = Some(filter.into());
            self
        }

        /// `EnvFilter` directives for this configuration.
        pub fn directives(&self) -> String {
            if let Some(filter) = &self.filter_override {
                return filter.clone();
            }
            let level = |l: Level| l.as_str().to_ascii_lowercase();
            let mut directives = vec![
                level(self.default_level),
                format!("term_probe={}", level(self.probe_level)),
            ];
            directives.extend(
                DRIVER_TARGETS
                    .iter()
                    .map(|target| format!("{target}={}", level(self.driver_level))),
            );
            directives.join(",")
        }
    }

    /// Installs a global `tracing` subscriber.
    ///
    /// `RUST_LOG` wins over the configured directives. Fails when a global
    /// subscriber is already set.
    ///
    /// ```rust,no_run
    /// use term_probe::logging::setup::{init_logging, LogFormat, SubscriberConfig};
    ///
    /// init_logging(&SubscriberConfig::default().with_format(LogFormat::Json)).unwrap();
    /// ```
    pub fn init_logging(
        config: &SubscriberConfig,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let filter = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(config.directives()))?;

        let layer = match config.format {
            LogFormat::Pretty => tracing_subscriber::fmt::layer().pretty().boxed(),
            LogFormat::Compact => tracing_subscriber::fmt::layer().compact().boxed(),
            LogFormat::Json => tracing_subscriber::fmt::layer().json().boxed(),
        };

        tracing_subscriber::registry()
            .with(filter)
            .with(layer)
            .try_init()?;
        Ok(())
    }
}
