use serde::Deserialize;

/// Root data-layer configuration. Loaded from environment variables with the
/// prefix `DATALAYER__` and, optionally, a TOML/JSON/YAML config file.
#[derive(Debug, Clone, Deserialize)]
pub struct DataLayerConfig {
    #[serde(default)]
    pub data_observer: DataObserverConfig,
    #[serde(default)]
    pub ancestry: AncestryConfig,
    #[serde(default)]
    pub change: ChangeConfig,
    #[serde(default)]
    pub impression: ImpressionConfig,
    #[serde(default)]
    pub adaptors: AdaptorsConfig,
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

/// Readiness timing of the component-declaration observer.
#[derive(Debug, Clone, Deserialize)]
pub struct DataObserverConfig {
    /// Resolve after this long even if matches keep arriving (or none do).
    #[serde(default = "default_fallback_timeout_ms")]
    pub fallback_timeout_ms: u64,
    /// Resolve once no new component has matched for this long.
    #[serde(default = "default_quiet_period_ms")]
    pub quiet_period_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AncestryConfig {
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChangeConfig {
    /// Key for the captured input value when the element sets no
    /// `data-layer-changeable-key`.
    #[serde(default = "default_value_key")]
    pub default_value_key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ImpressionConfig {
    /// Visible fraction of the element required for an impression.
    #[serde(default = "default_impression_threshold")]
    pub threshold: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AdaptorsConfig {
    /// Origin used to absolutize relative `LinkHref` values.
    #[serde(default = "default_site_origin")]
    pub site_origin: String,
    #[serde(default)]
    pub gtm_container_id: Option<String>,
    #[serde(default)]
    pub ga_measurement_id: Option<String>,
}

// Default functions
fn default_log_filter() -> String {
    "datalayer=info".to_string()
}
fn default_fallback_timeout_ms() -> u64 {
    800
}
fn default_quiet_period_ms() -> u64 {
    200
}
fn default_max_depth() -> usize {
    crate::ancestry::DEFAULT_MAX_DEPTH
}
fn default_value_key() -> String {
    "changedValue".to_string()
}
fn default_impression_threshold() -> f64 {
    1.0
}
fn default_site_origin() -> String {
    "http://localhost".to_string()
}

impl Default for DataObserverConfig {
    fn default() -> Self {
        Self {
            fallback_timeout_ms: default_fallback_timeout_ms(),
            quiet_period_ms: default_quiet_period_ms(),
        }
    }
}

impl Default for AncestryConfig {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
        }
    }
}

impl Default for ChangeConfig {
    fn default() -> Self {
        Self {
            default_value_key: default_value_key(),
        }
    }
}

impl Default for ImpressionConfig {
    fn default() -> Self {
        Self {
            threshold: default_impression_threshold(),
        }
    }
}

impl Default for AdaptorsConfig {
    fn default() -> Self {
        Self {
            site_origin: default_site_origin(),
            gtm_container_id: None,
            ga_measurement_id: None,
        }
    }
}

impl Default for DataLayerConfig {
    fn default() -> Self {
        Self {
            data_observer: DataObserverConfig::default(),
            ancestry: AncestryConfig::default(),
            change: ChangeConfig::default(),
            impression: ImpressionConfig::default(),
            adaptors: AdaptorsConfig::default(),
            log_filter: default_log_filter(),
        }
    }
}

impl DataLayerConfig {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, config::ConfigError> {
        Self::builder().build()?.try_deserialize()
    }

    /// Load a config file, with environment variables layered on top.
    pub fn load_from(path: &std::path::Path) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::File::from(path))
            .add_source(Self::environment())
            .build()?
            .try_deserialize()
    }

    fn builder() -> config::ConfigBuilder<config::builder::DefaultState> {
        config::Config::builder().add_source(Self::environment())
    }

    fn environment() -> config::Environment {
        config::Environment::with_prefix("DATALAYER")
            .separator("__")
            .try_parsing(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = DataLayerConfig::default();
        assert_eq!(config.data_observer.fallback_timeout_ms, 800);
        assert_eq!(config.data_observer.quiet_period_ms, 200);
        assert_eq!(config.ancestry.max_depth, 32);
        assert_eq!(config.change.default_value_key, "changedValue");
        assert_eq!(config.impression.threshold, 1.0);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: DataLayerConfig = config::Config::builder()
            .add_source(config::File::from_str(
                "[data_observer]\nquiet_period_ms = 50\n",
                config::FileFormat::Toml,
            ))
            .build()
            .and_then(|c| c.try_deserialize())
            .expect("config should deserialize");

        assert_eq!(config.data_observer.quiet_period_ms, 50);
        assert_eq!(config.data_observer.fallback_timeout_ms, 800);
        assert_eq!(config.adaptors.site_origin, "http://localhost");
    }
}
