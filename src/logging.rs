//! Tracing subscriber setup.

use tracing_subscriber::EnvFilter;

use crate::storage::{ConfigError, LoggingConfig};

/// Installs a global fmt subscriber filtered by `level`, an `EnvFilter` directive.
///
/// Fails when the directive does not parse or a global subscriber is already set.
pub fn init_logging(level: &str) -> Result<(), ConfigError> {
    install(level, false)
}

/// Installs the subscriber described by `config`.
pub fn init_logging_with(config: &LoggingConfig) -> Result<(), ConfigError> {
    install(&config.level, config.ansi)
}

fn install(level: &str, ansi: bool) -> Result<(), ConfigError> {
    let filter = EnvFilter::try_new(level).map_err(|err| ConfigError::Logging {
        filter: level.to_owned(),
        reason: err.to_string(),
    })?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(ansi)
        .with_target(true)
        .try_init()
        .map_err(|err| ConfigError::Logging {
            filter: level.to_owned(),
            reason: err.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_malformed_filter() {
        assert!(matches!(
            init_logging("sombra_index=loud"),
            Err(ConfigError::Logging { .. })
        ));
    }

    #[test]
    fn second_install_fails() {
        let config = LoggingConfig {
            level: "warn".to_owned(),
            ansi: false,
        };
        // Another test may have installed the subscriber first.
        let _ = init_logging_with(&config);
        assert!(init_logging("info").is_err());
    }
}
