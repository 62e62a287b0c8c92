use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde_json::json;
use skucast_core::{ApplicationError, HistoricalRecord, LoadOptions, RecordAggregator};
use skucast_db::{connect_with_settings, migrations, IndexSnapshotRepository, SqlIndexSnapshotRepository};
use tracing::{info, warn};

use crate::commands::{application_failure, load_config, load_rules, runtime, CommandResult, Failure};

#[derive(Debug, Clone)]
pub struct BuildArgs {
    pub records: PathBuf,
    pub rules: Option<PathBuf>,
    pub as_of_year: Option<i32>,
}

/// Records parsed from a line-delimited JSON file.
#[derive(Debug, Default)]
pub struct RecordBatch {
    pub records: Vec<HistoricalRecord>,
    /// 1-based numbers of lines that did not parse as a record.
    pub skipped_lines: Vec<usize>,
}

pub fn run(options: &LoadOptions, args: BuildArgs) -> CommandResult {
    let mut options = options.clone();
    if args.rules.is_some() {
        options.overrides.rules_path = args.rules;
    }
    if args.as_of_year.is_some() {
        options.overrides.as_of_year = args.as_of_year;
    }

    let config = match load_config("build", &options) {
        Ok(config) => config,
        Err(result) => return result,
    };

    let rules = match load_rules(&config) {
        Ok(rules) => rules,
        Err(error) => return CommandResult::from_failure("build", application_failure("build", error)),
    };

    let batch = match read_records(&args.records) {
        Ok(batch) => batch,
        Err(error) => {
            let error = ApplicationError::Input(format!("{error:#}"));
            return CommandResult::from_failure("build", application_failure("build", error));
        }
    };

    let as_of_year = config.build.resolved_as_of_year();
    let (index, stats) =
        RecordAggregator::new(&rules, config.build.params()).build(&batch.records, as_of_year);

    let runtime = match runtime("build") {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    let result = runtime.block_on(async {
        let pool = connect_with_settings(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await
        .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;
        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))?;
        let build_id = SqlIndexSnapshotRepository::new(pool.clone())
            .replace(&index, &stats)
            .await
            .map_err(|error| {
                application_failure("build", ApplicationError::Persistence(error.to_string()))
            })?;
        pool.close().await;
        Ok::<String, Failure>(build_id)
    });

    match result {
        Ok(build_id) => {
            info!(
                event_name = "cli.build.completed",
                build_id = %build_id,
                records = batch.records.len(),
                skipped_lines = batch.skipped_lines.len(),
                "index rebuilt"
            );
            CommandResult::success_with_data(
                "build",
                format!(
                    "processed {} records into {} keys",
                    stats.total_records, stats.distinct_keys
                ),
                json!({
                    "build_id": build_id,
                    "skipped_lines": batch.skipped_lines,
                    "stats": stats,
                }),
            )
        }
        Err(failure) => CommandResult::from_failure("build", failure),
    }
}

pub fn read_records(path: &Path) -> anyhow::Result<RecordBatch> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read records from `{}`", path.display()))?;
    Ok(parse_records(&raw))
}

/// Blank lines are ignored; malformed lines are skipped and reported, never fatal.
pub fn parse_records(raw: &str) -> RecordBatch {
    let mut batch = RecordBatch::default();
    for (offset, line) in raw.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<HistoricalRecord>(line) {
            Ok(record) => batch.records.push(record),
            Err(error) => {
                warn!(
                    event_name = "cli.build.skipped_line",
                    line = offset + 1,
                    error = %error,
                    "skipping unparseable record"
                );
                batch.skipped_lines.push(offset + 1);
            }
        }
    }
    batch
}
