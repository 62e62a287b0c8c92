use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{Datelike, Utc};
use serde::{Deserialize, Serialize};

use crate::aggregate::{BuildParams, DEFAULT_FUTURE_YEAR_HORIZON, DEFAULT_MIN_YEAR};
use crate::errors::ConfigurationError;
use crate::scoring::ScoringParams;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub rules: RulesConfig,
    pub build: BuildConfig,
    pub scoring: ScoringParams,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RulesConfig {
    /// Rule-table TOML file. Without one the built-in defaults apply.
    pub path: Option<PathBuf>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct BuildConfig {
    pub min_year: i32,
    pub future_year_horizon: i32,
    /// Reference year for the accepted model-year window; the current UTC year when unset.
    pub as_of_year: Option<i32>,
    pub shards: usize,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub rules_path: Option<PathBuf>,
    pub as_of_year: Option<i32>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://skucast.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            rules: RulesConfig::default(),
            build: BuildConfig {
                min_year: DEFAULT_MIN_YEAR,
                future_year_horizon: DEFAULT_FUTURE_YEAR_HORIZON,
                as_of_year: None,
                shards: BuildParams::default().shards,
            },
            scoring: ScoringParams::default(),
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl FromStr for LogFormat {
    type Err = ConfigurationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigurationError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl BuildConfig {
    pub fn params(&self) -> BuildParams {
        BuildParams {
            min_year: self.min_year,
            future_year_horizon: self.future_year_horizon,
            shards: self.shards,
        }
    }

    pub fn resolved_as_of_year(&self) -> i32 {
        self.as_of_year.unwrap_or_else(|| Utc::now().year())
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigurationError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("skucast.toml"));
            return Err(ConfigurationError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(rules) = patch.rules {
            if let Some(path) = rules.path {
                self.rules.path = Some(path);
            }
        }

        if let Some(build) = patch.build {
            if let Some(min_year) = build.min_year {
                self.build.min_year = min_year;
            }
            if let Some(future_year_horizon) = build.future_year_horizon {
                self.build.future_year_horizon = future_year_horizon;
            }
            if let Some(as_of_year) = build.as_of_year {
                self.build.as_of_year = Some(as_of_year);
            }
            if let Some(shards) = build.shards {
                self.build.shards = shards;
            }
        }

        if let Some(scoring) = patch.scoring {
            if let Some(alpha) = scoring.alpha {
                self.scoring.alpha = alpha;
            }
            if let Some(vin_boost) = scoring.vin_boost {
                self.scoring.vin_boost = vin_boost;
            }
            if let Some(top_k) = scoring.top_k {
                self.scoring.top_k = top_k;
            }
            if let Some(lambda) = scoring.lambda {
                self.scoring.lambda = lambda;
            }
            if let Some(min_evidence) = scoring.min_evidence {
                self.scoring.min_evidence = min_evidence;
            }
            if let Some(backoff_weight) = scoring.backoff_weight {
                self.scoring.backoff_weight = backoff_weight;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigurationError> {
        if let Some(value) = read_env("SKUCAST_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("SKUCAST_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse_env("SKUCAST_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("SKUCAST_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_env("SKUCAST_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("SKUCAST_RULES_PATH") {
            self.rules.path = Some(PathBuf::from(value));
        }

        if let Some(value) = read_env("SKUCAST_BUILD_MIN_YEAR") {
            self.build.min_year = parse_env("SKUCAST_BUILD_MIN_YEAR", &value)?;
        }
        if let Some(value) = read_env("SKUCAST_BUILD_FUTURE_YEAR_HORIZON") {
            self.build.future_year_horizon =
                parse_env("SKUCAST_BUILD_FUTURE_YEAR_HORIZON", &value)?;
        }
        if let Some(value) = read_env("SKUCAST_BUILD_AS_OF_YEAR") {
            self.build.as_of_year = Some(parse_env("SKUCAST_BUILD_AS_OF_YEAR", &value)?);
        }
        if let Some(value) = read_env("SKUCAST_BUILD_SHARDS") {
            self.build.shards = parse_env("SKUCAST_BUILD_SHARDS", &value)?;
        }

        if let Some(value) = read_env("SKUCAST_SCORING_ALPHA") {
            self.scoring.alpha = parse_env("SKUCAST_SCORING_ALPHA", &value)?;
        }
        if let Some(value) = read_env("SKUCAST_SCORING_VIN_BOOST") {
            self.scoring.vin_boost = parse_env("SKUCAST_SCORING_VIN_BOOST", &value)?;
        }
        if let Some(value) = read_env("SKUCAST_SCORING_TOP_K") {
            self.scoring.top_k = parse_env("SKUCAST_SCORING_TOP_K", &value)?;
        }
        if let Some(value) = read_env("SKUCAST_SCORING_LAMBDA") {
            self.scoring.lambda = parse_env("SKUCAST_SCORING_LAMBDA", &value)?;
        }
        if let Some(value) = read_env("SKUCAST_SCORING_MIN_EVIDENCE") {
            self.scoring.min_evidence = parse_env("SKUCAST_SCORING_MIN_EVIDENCE", &value)?;
        }
        if let Some(value) = read_env("SKUCAST_SCORING_BACKOFF_WEIGHT") {
            self.scoring.backoff_weight = parse_env("SKUCAST_SCORING_BACKOFF_WEIGHT", &value)?;
        }

        let log_level = read_env("SKUCAST_LOGGING_LEVEL").or_else(|| read_env("SKUCAST_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("SKUCAST_LOGGING_FORMAT").or_else(|| read_env("SKUCAST_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(rules_path) = overrides.rules_path {
            self.rules.path = Some(rules_path);
        }
        if let Some(as_of_year) = overrides.as_of_year {
            self.build.as_of_year = Some(as_of_year);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        validate_database(&self.database)?;
        validate_build(&self.build)?;
        validate_scoring(&self.scoring)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("skucast.toml"), PathBuf::from("config/skucast.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigurationError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigurationError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigurationError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigurationError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigurationError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigurationError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigurationError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigurationError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigurationError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigurationError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_build(build: &BuildConfig) -> Result<(), ConfigurationError> {
    if !(1900..=2100).contains(&build.min_year) {
        return Err(ConfigurationError::Validation(
            "build.min_year must be in range 1900..=2100".to_string(),
        ));
    }
    if !(0..=10).contains(&build.future_year_horizon) {
        return Err(ConfigurationError::Validation(
            "build.future_year_horizon must be in range 0..=10".to_string(),
        ));
    }
    if let Some(as_of_year) = build.as_of_year {
        if as_of_year > 2100 {
            return Err(ConfigurationError::Validation(format!(
                "build.as_of_year ({as_of_year}) must not exceed 2100"
            )));
        }
        if as_of_year < build.min_year {
            return Err(ConfigurationError::Validation(format!(
                "build.as_of_year ({as_of_year}) must not precede build.min_year ({})",
                build.min_year
            )));
        }
    }
    if build.shards == 0 || build.shards > 256 {
        return Err(ConfigurationError::Validation(
            "build.shards must be in range 1..=256".to_string(),
        ));
    }
    Ok(())
}

fn validate_scoring(scoring: &ScoringParams) -> Result<(), ConfigurationError> {
    if !scoring.alpha.is_finite() || scoring.alpha <= 0.0 {
        return Err(ConfigurationError::Validation(
            "scoring.alpha must be a positive number".to_string(),
        ));
    }
    if !(1.0..=2.0).contains(&scoring.vin_boost) {
        return Err(ConfigurationError::Validation(
            "scoring.vin_boost must be in range 1.0..=2.0".to_string(),
        ));
    }
    if scoring.top_k == 0 {
        return Err(ConfigurationError::Validation(
            "scoring.top_k must be greater than zero".to_string(),
        ));
    }
    if !(0.0..=1.0).contains(&scoring.lambda) {
        return Err(ConfigurationError::Validation(
            "scoring.lambda must be in range 0.0..=1.0".to_string(),
        ));
    }
    if !scoring.min_evidence.is_finite() || scoring.min_evidence < 0.0 {
        return Err(ConfigurationError::Validation(
            "scoring.min_evidence must be zero or greater".to_string(),
        ));
    }
    if !(0.0..=1.0).contains(&scoring.backoff_weight) {
        return Err(ConfigurationError::Validation(
            "scoring.backoff_weight must be in range 0.0..=1.0".to_string(),
        ));
    }
    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigurationError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigurationError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_env<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigurationError> {
    value.trim().parse::<T>().map_err(|_| ConfigurationError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    rules: Option<RulesPatch>,
    build: Option<BuildPatch>,
    scoring: Option<ScoringPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct RulesPatch {
    path: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct BuildPatch {
    min_year: Option<i32>,
    future_year_horizon: Option<i32>,
    as_of_year: Option<i32>,
    shards: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct ScoringPatch {
    alpha: Option<f64>,
    vin_boost: Option<f64>,
    top_k: Option<usize>,
    lambda: Option<f64>,
    min_evidence: Option<f64>,
    backoff_weight: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::path::PathBuf;
    use std::sync::{Mutex, OnceLock};

    use chrono::{Datelike, Utc};
    use tempfile::TempDir;

    use super::{AppConfig, ConfigOverrides, LoadOptions, LogFormat};
    use crate::errors::ConfigurationError;

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_SKUCAST_RULES_DIR", "/srv/rules");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("skucast.toml");
            fs::write(
                &path,
                r#"
[rules]
path = "${TEST_SKUCAST_RULES_DIR}/catalog.toml"

[scoring]
vin_boost = 1.45
top_k = 5
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.rules.path == Some(PathBuf::from("/srv/rules/catalog.toml")),
                "rules path should be interpolated from environment",
            )?;
            ensure(config.scoring.vin_boost == 1.45, "vin boost should come from file")?;
            ensure(config.scoring.top_k == 5, "top_k should come from file")?;
            ensure(config.scoring.lambda == 0.7, "unset keys keep their defaults")?;
            Ok(())
        })();

        clear_vars(&["TEST_SKUCAST_RULES_DIR"]);
        result
    }

    #[test]
    fn missing_interpolation_variable_is_reported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
        let path = dir.path().join("skucast.toml");
        fs::write(&path, "[database]\nurl = \"${SKUCAST_TEST_UNSET_VARIABLE}\"\n")
            .map_err(|err| err.to_string())?;

        let error = AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() });
        ensure(
            matches!(
                error,
                Err(ConfigurationError::MissingEnvInterpolation { ref var })
                    if var == "SKUCAST_TEST_UNSET_VARIABLE"
            ),
            "unset interpolation variable should be named",
        )
    }

    #[test]
    fn logging_env_aliases_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("SKUCAST_LOG_LEVEL", "warn");
        env::set_var("SKUCAST_LOG_FORMAT", "json");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.logging.level == "warn", "warning log level should be set from env var")?;
            ensure(
                matches!(config.logging.format, LogFormat::Json),
                "json logging format should be set from env var",
            )?;
            Ok(())
        })();

        clear_vars(&["SKUCAST_LOG_LEVEL", "SKUCAST_LOG_FORMAT"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("SKUCAST_DATABASE_URL", "sqlite://from-env.db");
        env::set_var("SKUCAST_BUILD_SHARDS", "3");
        env::set_var("SKUCAST_BUILD_AS_OF_YEAR", "2022");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("skucast.toml");
            fs::write(
                &path,
                r#"
[database]
url = "sqlite://from-file.db"

[build]
shards = 12
min_year = 1995

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    database_url: Some("sqlite://from-override.db".to_string()),
                    log_level: Some("debug".to_string()),
                    as_of_year: Some(2024),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.database.url == "sqlite://from-override.db",
                "override database url should win",
            )?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            ensure(config.build.shards == 3, "env shard count should win over file")?;
            ensure(config.build.min_year == 1995, "file min year should win over default")?;
            ensure(config.build.as_of_year == Some(2024), "override as-of year should win")?;
            ensure(config.build.params().window(2024).max_year == 2026, "window follows horizon")?;
            Ok(())
        })();

        clear_vars(&["SKUCAST_DATABASE_URL", "SKUCAST_BUILD_SHARDS", "SKUCAST_BUILD_AS_OF_YEAR"]);
        result
    }

    #[test]
    fn invalid_numeric_env_override_is_rejected() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("SKUCAST_SCORING_TOP_K", "ten");

        let result = (|| -> Result<(), String> {
            let error = AppConfig::load(LoadOptions::default());
            ensure(
                matches!(
                    error,
                    Err(ConfigurationError::InvalidEnvOverride { ref key, .. })
                        if key == "SKUCAST_SCORING_TOP_K"
                ),
                "non-numeric top_k should be an invalid env override",
            )
        })();

        clear_vars(&["SKUCAST_SCORING_TOP_K"]);
        result
    }

    #[test]
    fn validation_fails_fast_with_actionable_error() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("SKUCAST_SCORING_VIN_BOOST", "3.5");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => {
                    return Err("expected validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };
            let has_message = matches!(
                error,
                ConfigurationError::Validation(ref message) if message.contains("scoring.vin_boost")
            );
            ensure(has_message, "validation failure should mention scoring.vin_boost")
        })();

        clear_vars(&["SKUCAST_SCORING_VIN_BOOST"]);
        result
    }

    #[test]
    fn as_of_year_beyond_2100_is_rejected() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("SKUCAST_BUILD_AS_OF_YEAR", "2147483647");

        let result = (|| -> Result<(), String> {
            let error = AppConfig::load(LoadOptions::default());
            ensure(
                matches!(
                    error,
                    Err(ConfigurationError::Validation(ref message))
                        if message.contains("build.as_of_year")
                ),
                "an as-of year past 2100 should fail validation",
            )
        })();

        clear_vars(&["SKUCAST_BUILD_AS_OF_YEAR"]);
        result
    }

    #[test]
    fn required_file_must_exist() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
        let missing = dir.path().join("absent.toml");
        let error = AppConfig::load(LoadOptions {
            config_path: Some(missing.clone()),
            require_file: true,
            ..LoadOptions::default()
        });

        ensure(
            matches!(error, Err(ConfigurationError::MissingConfigFile(ref path)) if *path == missing),
            "missing required file should be reported with its path",
        )
    }

    #[test]
    fn defaults_are_valid_and_track_the_current_year() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let config = AppConfig::default();
        config.validate().map_err(|err| err.to_string())?;
        ensure(config.build.min_year == 1990, "default min year is 1990")?;
        ensure(config.build.future_year_horizon == 2, "default horizon is two years")?;
        ensure(
            config.build.resolved_as_of_year() == Utc::now().year(),
            "unset as-of year resolves to the current year",
        )?;
        ensure(matches!(config.logging.format, LogFormat::Compact), "default format is compact")
    }
}
