// tests/cli_and_logging.rs

mod common;
use crate::common::builders::ConfigFileBuilder;

use std::path::PathBuf;

use clap::Parser;
use tracing::level_filters::LevelFilter;

use avian::cli::{CliArgs, LogLevel};
use avian::logging::{log_filter, parse_level_str};
use avian::resolve_identity;
use avian::types::{AppIdentity, AppMode};

#[test]
fn cli_level_wins_over_env() {
    let filter = log_filter(Some(LogLevel::Debug), Some("trace"));
    assert_eq!(filter.max_level_hint(), Some(LevelFilter::DEBUG));
}

#[test]
fn env_accepts_levels_and_directives() {
    assert_eq!(log_filter(None, Some("warn")).max_level_hint(), Some(LevelFilter::WARN));
    assert_eq!(
        log_filter(None, Some("info,avian::jobs=trace")).max_level_hint(),
        Some(LevelFilter::TRACE)
    );
    assert_eq!(log_filter(None, None).max_level_hint(), Some(LevelFilter::INFO));
    assert_eq!(log_filter(None, Some("  ")).max_level_hint(), Some(LevelFilter::INFO));
}

#[test]
fn level_names_parse() {
    assert_eq!(parse_level_str("Warning"), Some(tracing::Level::WARN));
    assert_eq!(parse_level_str("loud"), None);
}

#[test]
fn worker_flag_is_accepted() {
    let args = CliArgs::try_parse_from(["avian", "--worker", "3", "--config", "Avian.toml"])
        .expect("valid args");
    assert_eq!(args.worker, Some(3));
    assert_eq!(args.config, Some(PathBuf::from("Avian.toml")));
}

#[test]
fn identity_prefers_flags_then_config_then_defaults() {
    let cfg = ConfigFileBuilder::new().build();
    let args = CliArgs::try_parse_from(["avian"]).expect("valid args");
    let identity = resolve_identity(&args, &cfg, PathBuf::from("/srv/shop"));
    // Only meaningful when the environment does not set AVIAN_APP_*.
    if std::env::var_os("AVIAN_APP_NAME").is_none() && std::env::var_os("AVIAN_APP_PORT").is_none() {
        assert_eq!(identity.name, AppIdentity::DEFAULT_NAME);
        assert_eq!(identity.port, AppIdentity::DEFAULT_PORT);
    }

    let args = CliArgs::try_parse_from([
        "avian",
        "--name",
        "shop",
        "--port",
        "9000",
        "--mode",
        "production",
        "--bundle-only",
    ])
    .expect("valid args");
    let identity = resolve_identity(&args, &cfg, PathBuf::from("/srv/shop"));
    assert_eq!(identity.name, "shop");
    assert_eq!(identity.port, 9000);
    assert_eq!(identity.mode, AppMode::Production);
    assert!(args.bundle_only);

    let vars = identity.env_vars();
    assert!(vars.contains(&("AVIAN_APP_PORT", "9000".to_string())));
    assert!(vars.contains(&("AVIAN_APP_MODE", "production".to_string())));
}
