//! Counters for the objects the front end creates.

use error_stack::Report;
use prometheus::{Encoder as _, IntCounter, Registry, TextEncoder};

use crate::error::ConfigurationError;

pub struct WfeMetrics {
    registry: Registry,
    pub registrations: IntCounter,
    pub pending_authorizations: IntCounter,
    pub certificates: IntCounter,
    pub revoked_certificates: IntCounter,
}

fn counter(registry: &Registry, name: &str, help: &str) -> Result<IntCounter, Report<ConfigurationError>> {
    let counter = IntCounter::new(name, help).map_err(|e| {
        Report::new(ConfigurationError::new("Invalid metric")).attach(format!("{name}: {e}"))
    })?;
    registry.register(Box::new(counter.clone())).map_err(|e| {
        Report::new(ConfigurationError::new("Failed to register metric"))
            .attach(format!("{name}: {e}"))
    })?;
    Ok(counter)
}

impl WfeMetrics {
    /// Create the counters in a registry of their own.
    ///
    /// # Errors
    ///
    /// Returns an error if a counter cannot be registered.
    pub fn new() -> Result<Self, Report<ConfigurationError>> {
        let registry = Registry::new();
        Ok(Self {
            registrations: counter(
                &registry,
                "acme_wfe_registrations_total",
                "Registrations created",
            )?,
            pending_authorizations: counter(
                &registry,
                "acme_wfe_pending_authorizations_total",
                "Authorizations created in the pending state",
            )?,
            certificates: counter(&registry, "acme_wfe_certificates_total", "Certificates issued")?,
            revoked_certificates: counter(
                &registry,
                "acme_wfe_revoked_certificates_total",
                "Certificates revoked",
            )?,
            registry,
        })
    }

    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Text exposition of every counter.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding fails.
    pub fn render(&self) -> Result<String, Report<ConfigurationError>> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(|e| {
                Report::new(ConfigurationError::new("Failed to encode metrics")).attach(e.to_string())
            })?;
        String::from_utf8(buffer).map_err(|e| {
            Report::new(ConfigurationError::new("Failed to encode metrics")).attach(e.to_string())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_start_at_zero_and_render() {
        let metrics = WfeMetrics::new().expect("metrics register");
        assert_eq!(metrics.registrations.get(), 0);

        metrics.certificates.inc();
        let text = metrics.render().expect("renders");
        assert!(text.contains("acme_wfe_certificates_total 1"));
        assert!(text.contains("acme_wfe_revoked_certificates_total 0"));
        assert_eq!(metrics.registry().gather().len(), 4);
    }

    #[test]
    fn instances_do_not_share_counters() {
        let first = WfeMetrics::new().expect("metrics register");
        let second = WfeMetrics::new().expect("metrics register");
        first.registrations.inc();
        assert_eq!(second.registrations.get(), 0);
    }
}
