use error_stack::{Report, ResultExt};

use acme_wfe_common::constants::AUDIT_TARGET;
use acme_wfe_common::error::ConfigurationError;

/// Operational logs go to stdout, audit records to stderr.
pub fn init_logger() -> Result<(), Report<ConfigurationError>> {
    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{}  {} [{}] {}",
                chrono::Local::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
                record.level(),
                record.target(),
                message
            ))
        })
        .level(log::LevelFilter::Debug)
        .level_for("hyper", log::LevelFilter::Info)
        .chain(
            fern::Dispatch::new()
                .filter(|metadata| metadata.target() == AUDIT_TARGET)
                .chain(std::io::stderr()),
        )
        .chain(
            fern::Dispatch::new()
                .filter(|metadata| metadata.target() != AUDIT_TARGET)
                .chain(std::io::stdout()),
        )
        .apply()
        .change_context(ConfigurationError::new("Failed to initialize logger"))
}
