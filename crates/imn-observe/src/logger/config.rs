use crate::logger::format::LoggerFormat;

/// Logger configuration for the IMN daemons.
///
/// Both `imn-dbosd` and `imn-coordd` build this from the environment via
/// [`LoggerConfig::from_env`]. Targets stay on: the per-crate targets
/// (`imn_coord`, `imn_agent`, `imn_kv`, ...) are the filter axis operators
/// actually use, e.g. `LOG_LEVEL=info,imn_kv=debug`.
#[derive(Debug, Clone)]
pub struct LoggerConfig {
    pub format: LoggerFormat,
    /// An `EnvFilter` directive, not just a plain level.
    pub level: String,
    pub with_targets: bool,
    pub use_color: bool,
}

impl LoggerConfig {
    /// Read `LOG_FORMAT` and `LOG_LEVEL`. Color applies to the text format
    /// only, on a terminal, and is suppressed by `NO_COLOR`.
    pub fn from_env() -> Self {
        let format = LoggerFormat::parse(&std::env::var("LOG_FORMAT").unwrap_or_default());
        let level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        let use_color = format == LoggerFormat::Text
            && std::env::var("NO_COLOR").is_err()
            && atty::is(atty::Stream::Stdout);

        Self {
            format,
            level,
            with_targets: true,
            use_color,
        }
    }
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            format: LoggerFormat::Text,
            level: "info".to_string(),
            with_targets: true,
            use_color: atty::is(atty::Stream::Stdout),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_filtered_text() {
        let cfg = LoggerConfig::default();
        assert_eq!(cfg.format, LoggerFormat::Text);
        assert_eq!(cfg.level, "info");
        assert!(cfg.with_targets);
    }
}
