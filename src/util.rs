use std::path::PathBuf;

use tracing::level_filters::LevelFilter;

const METRAFLOW_CONFIG: &str = "METRAFLOW_CONFIG";

const DEFAULT_CONFIG: &str = "./metraflow.json";

pub fn get_default_config_path() -> PathBuf {
    PathBuf::from(DEFAULT_CONFIG)
}

/// Path given on the command line, then `METRAFLOW_CONFIG`, then the default
pub fn get_config_path(from_args: Option<PathBuf>) -> PathBuf {
    from_args.unwrap_or_else(|| {
        let path_from_env = std::env::var(METRAFLOW_CONFIG);
        path_from_env.map_or_else(|_| get_default_config_path(), PathBuf::from)
    })
}

const METRAFLOW_LOG: &str = "METRAFLOW_LOG";

const DEFAULT_LOG_LEVEL: LevelFilter = LevelFilter::INFO;

pub fn get_log_level() -> LevelFilter {
    let level_from_env = std::env::var(METRAFLOW_LOG);
    level_from_env.map_or(DEFAULT_LOG_LEVEL, |res| res.parse().unwrap_or(DEFAULT_LOG_LEVEL))
}
