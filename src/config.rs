use crate::constants;
use crate::error::{ExporterError, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use tracing::error;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub site: SiteConfig,
    #[serde(default)]
    pub attributes: AttributeConfig,
    #[serde(default)]
    pub delivery: DeliveryConfig,
}

/// Static site identity stamped onto every record. These values are threaded
/// into the transformer at construction time rather than read from process
/// state.
#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
    pub site_name: String,
    #[serde(default)]
    pub cloud_type: String,
    #[serde(default)]
    pub cloud_compute_service: Option<String>,
}

/// Control-plane attribute keys that vary between deployments.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AttributeConfig {
    /// User attribute resolved into the global user identity.
    pub identity: String,
    /// Image attribute resolved into the provenance URI.
    pub image_uri: String,
}

impl Default for AttributeConfig {
    fn default() -> Self {
        Self {
            identity: constants::TEMPLATE_IDENTITY.to_string(),
            image_uri: constants::TEMPLATE_APPLIANCE_URI.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    /// Base URL of the remote accounting service.
    pub endpoint: String,
    /// Global send budget; unset means unthrottled.
    pub records_per_min: Option<u64>,
    /// Upper bound on concurrently prepared records.
    pub max_in_flight: usize,
    pub timeout_seconds: u64,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:9623".to_string(),
            records_per_min: None,
            max_in_flight: 32,
            timeout_seconds: 30,
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let config_content = fs::read_to_string(path).map_err(|e| {
            ExporterError::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;

        let config: Config = toml::from_str(&config_content)?;
        config.check();
        Ok(config)
    }

    /// Reports configuration problems that are tolerated at runtime. Records
    /// are still produced with whatever identity is configured, so both
    /// checks log rather than fail.
    fn check(&self) {
        if self.site.site_name.is_empty() {
            error!("no site name in configuration");
        }
        if self.site.cloud_type.is_empty() {
            error!("no cloud type in configuration");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().expect("failed to create temp config");
        file.write_all(contents.as_bytes())
            .expect("failed to write temp config");
        file
    }

    #[test]
    fn full_config_parses() {
        let file = write_config(
            r#"
            [site]
            site_name = "TEST-SITE"
            cloud_type = "ACME Cloud"
            cloud_compute_service = "batch"

            [attributes]
            identity = "TEMPLATE/X509_DN"

            [delivery]
            endpoint = "http://accounting.example.org:9623"
            records_per_min = 120
            max_in_flight = 8
            "#,
        );

        let config = Config::load(file.path()).expect("config should parse");
        assert_eq!(config.site.site_name, "TEST-SITE");
        assert_eq!(config.site.cloud_compute_service.as_deref(), Some("batch"));
        assert_eq!(config.attributes.identity, "TEMPLATE/X509_DN");
        // Unspecified keys keep their defaults
        assert_eq!(config.attributes.image_uri, constants::TEMPLATE_APPLIANCE_URI);
        assert_eq!(config.delivery.records_per_min, Some(120));
        assert_eq!(config.delivery.max_in_flight, 8);
        assert_eq!(config.delivery.timeout_seconds, 30);
    }

    #[test]
    fn minimal_config_uses_defaults() {
        let file = write_config(
            r#"
            [site]
            site_name = "TEST-SITE"
            "#,
        );

        let config = Config::load(file.path()).expect("config should parse");
        assert_eq!(config.site.cloud_type, "");
        assert_eq!(config.delivery.records_per_min, None);
        assert_eq!(config.delivery.max_in_flight, 32);
    }

    #[test]
    fn missing_file_is_a_config_error() {
        let err = Config::load(Path::new("/nonexistent/usage_exporter.toml"))
            .expect_err("load should fail");
        assert!(matches!(err, ExporterError::Config(_)));
    }
}
