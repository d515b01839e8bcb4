use std::str;

use config::{Config, Environment, File, FileFormat};
use error_stack::{Report, ResultExt};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::ConfigurationError;

pub const ENVIRONMENT_VARIABLE_PREFIX: &str = "ACME_WFE";
pub const ENVIRONMENT_VARIABLE_SEPARATOR: &str = "__";

const DEFAULT_TERMS_TEXT: &str = "No terms of service have been published for this server.";

fn default_terms_text() -> String {
    DEFAULT_TERMS_TEXT.to_string()
}

fn default_listen_address() -> String {
    "127.0.0.1:4000".to_string()
}

fn default_max_body_bytes() -> usize {
    64 * 1024
}

fn default_nonce_capacity() -> usize {
    65_536
}

/// Front end behaviour.
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct Wfe {
    /// Base URL every ACME path is appended to, without a trailing slash.
    /// Routing matches paths from the root, so it must not carry a path,
    /// query or fragment.
    #[validate(url)]
    pub base_url: String,

    /// URL of the current subscriber agreement. It should carry a version
    /// identifier since clients agree to it by echoing it back verbatim.
    #[serde(default)]
    #[validate(url)]
    pub subscriber_agreement_url: Option<String>,

    /// Text served at the terms path.
    #[serde(default = "default_terms_text")]
    pub terms_text: String,

    /// DER or PEM issuer certificate served at the issuer path.
    #[serde(default)]
    pub issuer_certificate_path: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct Server {
    #[serde(default = "default_listen_address")]
    pub listen_address: String,

    #[serde(default = "default_max_body_bytes")]
    #[validate(range(min = 1024))]
    pub max_body_bytes: usize,
}

impl Default for Server {
    fn default() -> Self {
        Self {
            listen_address: default_listen_address(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct Nonce {
    /// Outstanding nonces retained before the oldest are swept.
    #[serde(default = "default_nonce_capacity")]
    #[validate(range(min = 1024))]
    pub capacity: usize,
}

impl Default for Nonce {
    fn default() -> Self {
        Self {
            capacity: default_nonce_capacity(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct Settings {
    #[validate(nested)]
    pub wfe: Wfe,
    #[serde(default)]
    #[validate(nested)]
    pub server: Server,
    #[serde(default)]
    #[validate(nested)]
    pub nonce: Nonce,
}

impl Settings {
    /// Load the embedded default configuration, with environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the embedded TOML or an override is invalid.
    pub fn new() -> Result<Self, Report<ConfigurationError>> {
        let toml_bytes = include_bytes!("../../../acme-wfe.toml");
        let toml_str = str::from_utf8(toml_bytes)
            .change_context(ConfigurationError::new("Embedded settings are not UTF-8"))?;

        Self::from_toml(toml_str)
    }

    /// Parse and validate settings from a TOML document, with environment
    /// overrides applied on top.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid, a required field is missing,
    /// or validation fails.
    pub fn from_toml(toml_str: &str) -> Result<Self, Report<ConfigurationError>> {
        let environment = Environment::default()
            .prefix(ENVIRONMENT_VARIABLE_PREFIX)
            .separator(ENVIRONMENT_VARIABLE_SEPARATOR);

        let toml = File::from_str(toml_str, FileFormat::Toml);
        let config = Config::builder()
            .add_source(toml)
            .add_source(environment)
            .build()
            .change_context(ConfigurationError::new("Failed to build configuration"))?;

        let mut settings: Self = config
            .try_deserialize()
            .change_context(ConfigurationError::new("Failed to deserialize settings"))?;
        settings.validate().change_context(ConfigurationError::new(
            "Settings validation failed",
        ))?;

        let base = url::Url::parse(&settings.wfe.base_url)
            .change_context(ConfigurationError::new("Invalid base_url"))
            .attach(settings.wfe.base_url.clone())?;
        if base.path() != "/" || base.query().is_some() || base.fragment().is_some() {
            return Err(Report::new(ConfigurationError::new(
                "base_url must not carry a path, query or fragment",
            ))
            .attach(settings.wfe.base_url.clone()));
        }

        // Paths are appended verbatim, so a trailing slash would double up.
        let trimmed = settings.wfe.base_url.trim_end_matches('/').len();
        settings.wfe.base_url.truncate(trimmed);

        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL_TOML: &str = r#"
        [wfe]
        base_url = "https://acme.example.com"
        "#;

    #[test]
    fn test_settings_new() {
        let settings = Settings::new().expect("should load embedded settings");
        assert!(!settings.wfe.base_url.is_empty());
        assert!(!settings.server.listen_address.is_empty());
        assert!(settings.nonce.capacity >= 1024);
    }

    #[test]
    fn test_settings_defaults() {
        let settings = Settings::from_toml(MINIMAL_TOML).expect("should parse minimal settings");

        assert_eq!(settings.wfe.base_url, "https://acme.example.com");
        assert_eq!(settings.wfe.subscriber_agreement_url, None);
        assert_eq!(settings.wfe.terms_text, DEFAULT_TERMS_TEXT);
        assert_eq!(settings.server.listen_address, "127.0.0.1:4000");
        assert_eq!(settings.server.max_body_bytes, 64 * 1024);
        assert_eq!(settings.nonce.capacity, 65_536);
    }

    #[test]
    fn test_settings_trailing_slash_trimmed() {
        let settings = Settings::from_toml(
            r#"
            [wfe]
            base_url = "https://acme.example.com/"
            "#,
        )
        .expect("should parse settings");
        assert_eq!(settings.wfe.base_url, "https://acme.example.com");
    }

    #[test]
    fn test_settings_base_url_without_path() {
        for base_url in [
            "https://acme.example.com/prefix",
            "https://acme.example.com/prefix/",
            "https://acme.example.com/?x=1",
            "https://acme.example.com/#top",
        ] {
            let settings = Settings::from_toml(&format!(
                r#"
                [wfe]
                base_url = "{base_url}"
                "#
            ));
            assert!(settings.is_err(), "Should reject {base_url}");
        }
    }

    #[test]
    fn test_settings_missing_base_url() {
        let settings = Settings::from_toml(
            r#"
            [wfe]
            terms_text = "be nice"
            "#,
        );
        assert!(settings.is_err(), "Should fail without base_url");
    }

    #[test]
    fn test_settings_invalid_agreement_url() {
        let settings = Settings::from_toml(
            r#"
            [wfe]
            base_url = "https://acme.example.com"
            subscriber_agreement_url = "not a url"
            "#,
        );
        assert!(settings.is_err(), "Should reject a non-URL agreement");
    }

    #[test]
    fn test_settings_nonce_capacity_lower_bound() {
        let settings = Settings::from_toml(
            r#"
            [wfe]
            base_url = "https://acme.example.com"

            [nonce]
            capacity = 10
            "#,
        );
        assert!(settings.is_err(), "Should reject a tiny nonce capacity");
    }

    #[test]
    fn test_settings_invalid_toml_syntax() {
        let settings = Settings::from_toml(
            r#"
            [wfe
            base_url = "https://acme.example.com"
            "#,
        );
        assert!(settings.is_err(), "Should fail with invalid TOML syntax");
    }

    #[test]
    fn test_override_env() {
        temp_env::with_var(
            "ACME_WFE__WFE__SUBSCRIBER_AGREEMENT_URL",
            Some("https://acme.example.com/terms/v2"),
            || {
                let settings =
                    Settings::from_toml(MINIMAL_TOML).expect("should apply env override");
                assert_eq!(
                    settings.wfe.subscriber_agreement_url.as_deref(),
                    Some("https://acme.example.com/terms/v2")
                );
            },
        );
    }
}
