use serde_json::json;
use skucast_core::{normalize, LoadOptions};

use crate::commands::{application_failure, load_config, load_rules, CommandResult};

pub fn run(options: &LoadOptions, text: &str) -> CommandResult {
    let config = match load_config("normalize", options) {
        Ok(config) => config,
        Err(result) => return result,
    };

    let rules = match load_rules(&config) {
        Ok(rules) => rules,
        Err(error) => {
            return CommandResult::from_failure("normalize", application_failure("normalize", error))
        }
    };

    let normalized = normalize(text, &rules);
    CommandResult::success_with_data(
        "normalize",
        normalized.clone(),
        json!({
            "input": text,
            "normalized": normalized,
            "ruleset_fingerprint": rules.fingerprint(),
            "diagnostics": rules.diagnostics(),
        }),
    )
}
