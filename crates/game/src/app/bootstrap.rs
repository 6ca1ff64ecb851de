use std::env;

use engine::{resolve_app_paths, LoopConfig, Scene, StartupError};
use thiserror::Error;
use tracing::info;
use tracing_subscriber::EnvFilter;

use super::gameplay::{self, LevelConfigError};

const LEVEL_ENV_VAR: &str = "REWIND_LEVEL";
const MAX_TICKS_ENV_VAR: &str = "REWIND_MAX_TICKS";
const DEFAULT_LEVEL: &str = "proving_grounds";
const TARGET_TPS: u32 = 30;

#[derive(Debug, Error)]
pub(crate) enum AppError {
    #[error(transparent)]
    Startup(#[from] StartupError),
    #[error(transparent)]
    Level(#[from] LevelConfigError),
    #[error("invalid value for {var}: {value:?} ({reason})")]
    InvalidEnv {
        var: &'static str,
        value: String,
        reason: String,
    },
}

pub(crate) struct AppWiring {
    pub(crate) config: LoopConfig,
    pub(crate) scene: Box<dyn Scene>,
}

pub(crate) fn build_app() -> Result<AppWiring, AppError> {
    init_tracing();
    info!("=== Rewind Startup ===");

    let paths = resolve_app_paths()?;
    let level_name = level_name_from_env();
    let level_path = paths.levels_dir.join(format!("{level_name}.json"));
    let scene = gameplay::build_scene(&level_path)?;
    let config = LoopConfig {
        target_tps: TARGET_TPS,
        max_ticks: parse_max_ticks(env::var(MAX_TICKS_ENV_VAR).ok())?,
        ..LoopConfig::default()
    };
    info!(
        root = %paths.root.display(),
        level = %level_name,
        "app_wired"
    );

    Ok(AppWiring { config, scene })
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .compact()
        .init();
}

fn level_name_from_env() -> String {
    env::var(LEVEL_ENV_VAR)
        .ok()
        .map(|raw| raw.trim().to_string())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| DEFAULT_LEVEL.to_string())
}

fn parse_max_ticks(raw: Option<String>) -> Result<Option<u64>, AppError> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    match trimmed.parse::<u64>() {
        Ok(0) => Err(AppError::InvalidEnv {
            var: MAX_TICKS_ENV_VAR,
            value: raw.clone(),
            reason: "must be at least 1".to_string(),
        }),
        Ok(limit) => Ok(Some(limit)),
        Err(error) => Err(AppError::InvalidEnv {
            var: MAX_TICKS_ENV_VAR,
            value: raw.clone(),
            reason: error.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_ticks_absent_or_blank_means_unbounded() {
        assert_eq!(parse_max_ticks(None).expect("absent"), None);
        assert_eq!(parse_max_ticks(Some("  ".to_string())).expect("blank"), None);
    }

    #[test]
    fn max_ticks_parses_positive_integer() {
        assert_eq!(
            parse_max_ticks(Some(" 900 ".to_string())).expect("valid"),
            Some(900)
        );
    }

    #[test]
    fn max_ticks_rejects_zero_and_garbage() {
        assert!(matches!(
            parse_max_ticks(Some("0".to_string())),
            Err(AppError::InvalidEnv { .. })
        ));
        let error = parse_max_ticks(Some("soon".to_string())).unwrap_err();
        assert!(error.to_string().contains(MAX_TICKS_ENV_VAR));
    }
}
