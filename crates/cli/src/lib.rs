pub mod commands;
pub mod logging;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use skucast_core::{AppConfig, ConfigOverrides, LoadOptions};

use commands::build::BuildArgs;
use commands::predict::PredictArgs;

#[derive(Debug, Parser)]
#[command(
    name = "skucast",
    about = "Skucast operator CLI",
    long_about = "Build the part frequency index from historical records and predict part SKUs for vehicle queries.",
    after_help = "Examples:\n  skucast migrate\n  skucast build --records records.jsonl --rules rules.toml\n  skucast predict --maker mazda --series CX30 --description \"farol del izq\" --year 2020\n  skucast predict --vin 3MVDM2W7ANL000001 --description \"farol del izq\""
)]
pub struct Cli {
    #[arg(long, global = true, help = "Config file to load instead of skucast.toml")]
    config: Option<PathBuf>,
    #[arg(long, global = true, help = "Override database.url")]
    database_url: Option<String>,
    #[arg(long, global = true, help = "Override logging.level")]
    log_level: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Rebuild the frequency index from line-delimited JSON records")]
    Build {
        #[arg(long, help = "Line-delimited JSON file of historical records")]
        records: PathBuf,
        #[arg(long, help = "Rule-table TOML file (overrides rules.path)")]
        rules: Option<PathBuf>,
        #[arg(long, help = "Reference year for the model-year window (defaults to the current year)")]
        as_of_year: Option<i32>,
    },
    #[command(about = "Rank part SKUs for a vehicle and free-text part description")]
    Predict {
        #[arg(long, help = "Vehicle maker; taken from --vin when omitted")]
        maker: Option<String>,
        #[arg(long, help = "Vehicle series; taken from --vin when omitted")]
        series: Option<String>,
        #[arg(long)]
        description: String,
        #[arg(long, help = "17-character vehicle identification code")]
        vin: Option<String>,
        #[arg(long, help = "Vehicle model year")]
        year: Option<i32>,
    },
    #[command(about = "Print the normalized form of a part description")]
    Normalize {
        text: String,
    },
    #[command(about = "Inspect effective configuration values with source attribution")]
    Config,
}

impl Cli {
    fn load_options(&self) -> LoadOptions {
        LoadOptions {
            config_path: self.config.clone(),
            require_file: self.config.is_some(),
            overrides: ConfigOverrides {
                database_url: self.database_url.clone(),
                log_level: self.log_level.clone(),
                ..ConfigOverrides::default()
            },
        }
    }
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    let options = cli.load_options();

    // Config errors are reported by the command itself.
    if let Ok(config) = AppConfig::load(options.clone()) {
        logging::init(&config);
    }

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(&options),
        Command::Build { records, rules, as_of_year } => {
            commands::build::run(&options, BuildArgs { records, rules, as_of_year })
        }
        Command::Predict { maker, series, description, vin, year } => commands::predict::run(
            &options,
            PredictArgs { maker, series, description, vin, year },
        ),
        Command::Normalize { text } => commands::normalize::run(&options, &text),
        Command::Config => commands::config::run(&options),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
