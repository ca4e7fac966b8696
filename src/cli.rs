//! Command-line interface definitions.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// Default seconds between cycles in `auto` mode.
pub const DEFAULT_INTERVAL_SECS: u64 = 3600;

/// Giveaway agent - classify giveaway emails and enter the real ones.
#[derive(Parser, Debug)]
#[command(name = "giveaway-agent")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Run on a schedule (auto) or a single cycle (once)
    #[arg(long, value_enum, default_value_t = Mode::Once)]
    pub mode: Mode,

    /// Seconds between cycles in auto mode
    #[arg(long, default_value_t = DEFAULT_INTERVAL_SECS, value_parser = clap::value_parser!(u64).range(1..))]
    pub interval: u64,

    /// Path to the TOML configuration file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Log verbosity
    #[arg(long, value_enum, ignore_case = true, default_value_t = LogLevel::Info)]
    pub log_level: LogLevel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    /// Periodic cycles until interrupted
    Auto,
    /// One cycle, then exit
    Once,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    #[value(name = "DEBUG")]
    Debug,
    #[value(name = "INFO")]
    Info,
    #[value(name = "WARNING")]
    Warning,
    #[value(name = "ERROR")]
    Error,
}

impl LogLevel {
    /// `EnvFilter` directive for this level.
    pub fn directive(self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warning => "warn",
            Self::Error => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cli = Cli::try_parse_from(["giveaway-agent"]).unwrap();
        assert_eq!(cli.mode, Mode::Once);
        assert_eq!(cli.interval, 3600);
        assert_eq!(cli.config, None);
        assert_eq!(cli.log_level, LogLevel::Info);
    }

    #[test]
    fn full_invocation() {
        let cli = Cli::try_parse_from([
            "giveaway-agent",
            "--mode",
            "auto",
            "--interval",
            "900",
            "--config",
            "conf/agent.toml",
            "--log-level",
            "WARNING",
        ])
        .unwrap();
        assert_eq!(cli.mode, Mode::Auto);
        assert_eq!(cli.interval, 900);
        assert_eq!(cli.config, Some(PathBuf::from("conf/agent.toml")));
        assert_eq!(cli.log_level, LogLevel::Warning);
    }

    #[test]
    fn log_level_is_case_insensitive() {
        let cli = Cli::try_parse_from(["giveaway-agent", "--log-level", "debug"]).unwrap();
        assert_eq!(cli.log_level, LogLevel::Debug);
        assert_eq!(cli.log_level.directive(), "debug");
    }

    #[test]
    fn rejects_unknown_mode_and_zero_interval() {
        assert!(Cli::try_parse_from(["giveaway-agent", "--mode", "forever"]).is_err());
        assert!(Cli::try_parse_from(["giveaway-agent", "--interval", "0"]).is_err());
        assert!(Cli::try_parse_from(["giveaway-agent", "--log-level", "TRACE"]).is_err());
    }

    #[test]
    fn warning_maps_to_warn_filter() {
        assert_eq!(LogLevel::Warning.directive(), "warn");
        assert_eq!(LogLevel::Error.directive(), "error");
    }
}
