use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{json, Map, Value as JsonValue};
use skucast_core::LoadOptions;
use toml::Value;

use crate::commands::{load_config, CommandResult};

/// Config keys with the environment variable that can set each one.
const FIELDS: &[(&str, &str)] = &[
    ("database.url", "SKUCAST_DATABASE_URL"),
    ("database.max_connections", "SKUCAST_DATABASE_MAX_CONNECTIONS"),
    ("database.timeout_secs", "SKUCAST_DATABASE_TIMEOUT_SECS"),
    ("rules.path", "SKUCAST_RULES_PATH"),
    ("build.min_year", "SKUCAST_BUILD_MIN_YEAR"),
    ("build.future_year_horizon", "SKUCAST_BUILD_FUTURE_YEAR_HORIZON"),
    ("build.as_of_year", "SKUCAST_BUILD_AS_OF_YEAR"),
    ("build.shards", "SKUCAST_BUILD_SHARDS"),
    ("scoring.alpha", "SKUCAST_SCORING_ALPHA"),
    ("scoring.vin_boost", "SKUCAST_SCORING_VIN_BOOST"),
    ("scoring.top_k", "SKUCAST_SCORING_TOP_K"),
    ("scoring.lambda", "SKUCAST_SCORING_LAMBDA"),
    ("scoring.min_evidence", "SKUCAST_SCORING_MIN_EVIDENCE"),
    ("scoring.backoff_weight", "SKUCAST_SCORING_BACKOFF_WEIGHT"),
    ("logging.level", "SKUCAST_LOGGING_LEVEL"),
    ("logging.format", "SKUCAST_LOGGING_FORMAT"),
];

pub fn run(options: &LoadOptions) -> CommandResult {
    let config = match load_config("config", options) {
        Ok(config) => config,
        Err(result) => return result,
    };

    let config_file_path = detect_config_path(options.config_path.as_deref());
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut sources = Map::new();
    for (key_path, env_key) in FIELDS {
        let source =
            field_source(key_path, env_key, config_file_doc.as_ref(), config_file_path.as_deref());
        sources.insert((*key_path).to_string(), JsonValue::String(source));
    }

    CommandResult::success_with_data(
        "config",
        "effective config (source precedence: overrides > env > file > default)",
        json!({
            "config": config,
            "sources": sources,
        }),
    )
}

fn detect_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return path.exists().then(|| path.to_path_buf());
    }

    let root = PathBuf::from("skucast.toml");
    if root.exists() {
        return Some(root);
    }

    let nested = PathBuf::from("config/skucast.toml");
    if nested.exists() {
        return Some(nested);
    }

    None
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_key: &str,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if env::var_os(env_key).is_some() {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}
