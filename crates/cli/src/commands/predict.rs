use serde_json::json;
use skucast_core::{
    normalize, normalize_series, ApplicationError, LoadOptions, ScoringEngine, ScoringQuery,
};
use skucast_db::{connect_with_settings, IndexSnapshotRepository, SqlIndexSnapshotRepository};
use tracing::warn;

use crate::commands::{application_failure, load_config, load_rules, runtime, CommandResult, Failure};

#[derive(Debug, Clone)]
pub struct PredictArgs {
    pub maker: Option<String>,
    pub series: Option<String>,
    pub description: String,
    pub vin: Option<String>,
    pub year: Option<i32>,
}

pub fn run(options: &LoadOptions, args: PredictArgs) -> CommandResult {
    let config = match load_config("predict", options) {
        Ok(config) => config,
        Err(result) => return result,
    };

    let rules = match load_rules(&config) {
        Ok(rules) => rules,
        Err(error) => {
            return CommandResult::from_failure("predict", application_failure("predict", error))
        }
    };

    let runtime = match runtime("predict") {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    let loaded = runtime.block_on(async {
        let pool = connect_with_settings(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await
        .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;
        let snapshot = SqlIndexSnapshotRepository::new(pool.clone()).load().await.map_err(|error| {
            application_failure("predict", ApplicationError::Persistence(error.to_string()))
        })?;
        pool.close().await;
        Ok::<_, Failure>(snapshot)
    });

    let snapshot = match loaded {
        Ok(Some(snapshot)) => snapshot,
        Ok(None) => {
            return CommandResult::failure(
                "predict",
                "index_missing",
                "no index has been built yet; run `skucast build` first",
                5,
            )
        }
        Err(failure) => return CommandResult::from_failure("predict", failure),
    };

    let ruleset_matches = snapshot.stats.ruleset_fingerprint == rules.fingerprint();
    if !ruleset_matches {
        warn!(
            event_name = "predict.ruleset_mismatch",
            build_id = %snapshot.build_id,
            index_fingerprint = %snapshot.stats.ruleset_fingerprint,
            query_fingerprint = %rules.fingerprint(),
            "index was built with different rule tables"
        );
    }

    let vehicle = args.vin.as_deref().and_then(|vin| snapshot.index.identify_vehicle(vin));
    let inferred = vehicle.as_ref().filter(|identity| identity.is_reliable());
    if let Some(identity) = &vehicle {
        if identity.conflicted {
            warn!(
                event_name = "predict.vehicle_prefix_conflicted",
                prefix = identity.prefix.as_str(),
                "vehicle code prefix was observed with several makers"
            );
        }
    }

    let maker = match args.maker.or_else(|| inferred.and_then(|identity| identity.maker.clone())) {
        Some(maker) => maker,
        None => return missing_vehicle_field("maker"),
    };
    let series = match args.series.as_deref() {
        Some(series) => normalize_series(series, &rules),
        None => match inferred.and_then(|identity| identity.series.clone()) {
            Some(series) => series,
            None => return missing_vehicle_field("series"),
        },
    };

    let normalized_description = normalize(&args.description, &rules);
    let mut query = ScoringQuery::new(maker, series.clone(), normalized_description.clone());
    if let Some(vin) = args.vin {
        query = query.with_vehicle_code(vin);
    }
    let year = args.year.or_else(|| vehicle.as_ref().and_then(|identity| identity.model_year));
    if let Some(year) = year {
        query = query.with_model_year(year);
    }

    let predictions = ScoringEngine::new(&snapshot.index, config.scoring).score(&query);

    CommandResult::success_with_data(
        "predict",
        format!("{} candidates", predictions.len()),
        json!({
            "build_id": snapshot.build_id,
            "ruleset_matches": ruleset_matches,
            "normalized_description": normalized_description,
            "series": series,
            "vehicle": vehicle,
            "predictions": predictions,
        }),
    )
}

fn missing_vehicle_field(field: &str) -> CommandResult {
    CommandResult::from_failure(
        "predict",
        application_failure(
            "predict",
            ApplicationError::Input(format!(
                "--{field} is required unless --vin identifies it through a single-maker prefix"
            )),
        ),
    )
}
