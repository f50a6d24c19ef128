//! F1 Predictor CLI - Command-line interface for training and predictions

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use f1_predictor::config::{MissingValuePolicy, PipelineConfig, MODEL_DIR_ENV};
use f1_predictor::data::{write_results_csv, DriverHistoryIndex, SyntheticRaceGenerator};
use f1_predictor::persistence;
use f1_predictor::pipeline;
use f1_predictor::training::ModelFamily;
use f1_predictor::{Prediction, Predictor, RaceEntry};

#[derive(Parser)]
#[command(name = "f1-predictor")]
#[command(author, version, about = "F1 finishing-position prediction CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// JSON pipeline configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Directory for trained model artifacts
    #[arg(long, global = true, env = MODEL_DIR_ENV)]
    model_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a synthetic race-result CSV
    Generate {
        /// Output CSV path
        #[arg(short, long, default_value = "data/race_results.csv")]
        output: PathBuf,

        /// Number of races to generate
        #[arg(long)]
        races: Option<usize>,

        /// Random seed
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Train all model families and save the artifacts
    Train {
        /// Race-result CSV (synthetic data when omitted)
        #[arg(short, long)]
        data: Option<PathBuf>,

        /// Random seed for the generator, split and forest
        #[arg(long)]
        seed: Option<u64>,

        /// Fraction of rows held out for evaluation
        #[arg(long)]
        test_fraction: Option<f64>,

        /// Fit imputation means on the training split only
        #[arg(long)]
        train_only_imputation: bool,
    },

    /// Predict a driver's finishing position
    Predict {
        /// Driver name
        #[arg(long, required_unless_present = "entries")]
        driver: Option<String>,

        /// Track name
        #[arg(long, required_unless_present = "entries")]
        track: Option<String>,

        /// Starting grid position (1-20)
        #[arg(long, required_unless_present = "entries")]
        grid: Option<u8>,

        /// Weather (Dry or Wet)
        #[arg(long, default_value = "Dry")]
        weather: String,

        /// Track temperature in Celsius
        #[arg(long, default_value = "25.0")]
        temperature: f64,

        /// Race-result CSV used to fill in the driver's history
        #[arg(long)]
        data: Option<PathBuf>,

        /// Team (defaults to the driver's latest team when --data is given)
        #[arg(long)]
        team: Option<String>,

        /// Recent average finish
        #[arg(long)]
        recent_form: Option<f64>,

        /// Career win rate (0-1)
        #[arg(long)]
        win_rate: Option<f64>,

        /// Driver's average finish at this track
        #[arg(long)]
        track_avg: Option<f64>,

        /// Team's average finish at this track
        #[arg(long)]
        team_rating: Option<f64>,

        /// JSON file with an array of race entries to predict as a batch
        #[arg(long)]
        entries: Option<PathBuf>,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Show the saved models and feature importances
    Models,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn resolve_config(cli: &Cli) -> Result<PipelineConfig> {
    let config = match &cli.config {
        Some(path) => PipelineConfig::load(path)
            .with_context(|| format!("Failed to load config {:?}", path))?,
        None => PipelineConfig::default(),
    };
    let mut config = config.with_env_overrides();
    if let Some(dir) = &cli.model_dir {
        config.model_dir = dir.clone();
    }
    Ok(config)
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let mut config = resolve_config(&cli)?;

    println!("{}", "F1 Predictor CLI v0.1.0".cyan().bold());
    println!();

    match cli.command {
        Commands::Generate {
            output,
            races,
            seed,
        } => {
            if let Some(races) = races {
                config.synthetic.races = races;
            }
            generate(&config, &output, seed.unwrap_or(config.seed))?;
        }
        Commands::Train {
            data,
            seed,
            test_fraction,
            train_only_imputation,
        } => {
            if let Some(seed) = seed {
                config.seed = seed;
            }
            if let Some(fraction) = test_fraction {
                config.test_fraction = fraction;
            }
            if train_only_imputation {
                config.missing_values = MissingValuePolicy::TrainOnly;
            }
            train(&config, data.as_deref())?;
        }
        Commands::Predict {
            driver,
            track,
            grid,
            weather,
            temperature,
            data,
            team,
            recent_form,
            win_rate,
            track_avg,
            team_rating,
            entries,
            json,
        } => {
            let predictor = Predictor::from_dir(&config.model_dir).with_context(|| {
                format!(
                    "Failed to load models from {:?}; run `f1-predictor train` first",
                    config.model_dir
                )
            })?;

            if let Some(path) = entries {
                predict_batch(&predictor, &path, json)?;
            } else {
                let (Some(driver), Some(track), Some(grid)) = (driver, track, grid) else {
                    bail!("--driver, --track and --grid are required");
                };
                let overrides = EntryOverrides {
                    team,
                    recent_form,
                    win_rate,
                    track_avg,
                    team_rating,
                };
                let entry = build_entry(
                    &driver,
                    &track,
                    grid,
                    &weather,
                    temperature,
                    data.as_deref(),
                    overrides,
                )?;
                predict_single(&predictor, &entry, json)?;
            }
        }
        Commands::Models => {
            show_models(&config.model_dir)?;
        }
    }

    Ok(())
}

fn generate(config: &PipelineConfig, output: &Path, seed: u64) -> Result<()> {
    let results = SyntheticRaceGenerator::new(config.synthetic.clone()).load(seed);
    if let Some(parent) = output.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    write_results_csv(&results, output).context("Failed to write CSV")?;

    println!(
        "{}: {} results ({} races) -> {:?}",
        "Generated".green(),
        results.len(),
        config.synthetic.races,
        output
    );
    Ok(())
}

fn train(config: &PipelineConfig, data: Option<&Path>) -> Result<()> {
    let results = pipeline::load_results(config, data).context("Failed to load race results")?;

    let pb = ProgressBar::new(ModelFamily::ALL.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
            .progress_chars("#>-"),
    );
    pb.set_message("training");

    let outcome = pipeline::run_on(&results, config, |family, ok| {
        if !ok {
            pb.println(format!(
                "{} {} failed to fit",
                "Warning".yellow(),
                family.display_name()
            ));
        }
        pb.set_message(family.display_name());
        pb.inc(1);
    })
    .context("Training failed")?;
    pb.finish_and_clear();

    println!("{}", "Model Performance:".yellow().bold());
    println!("{:<24} {:>10} {:>10}", "Model", "Accuracy", "Macro F1");
    println!("{}", "-".repeat(46));
    for summary in outcome.registry.summaries() {
        let line = format!(
            "{:<24} {:>9.2}% {:>10.4}",
            summary.name,
            summary.accuracy * 100.0,
            summary.macro_f1
        );
        if summary.is_best {
            println!("{} {}", line.green(), "(best)".green());
        } else {
            println!("{}", line);
        }
    }
    println!();
    if outcome.unclassified > 0 {
        println!(
            "{}",
            format!(
                "{} rows without a classified finish were excluded",
                outcome.unclassified
            )
            .dimmed()
        );
    }
    println!("{}: {:?}", "Saved".green(), config.model_dir);
    Ok(())
}

struct EntryOverrides {
    team: Option<String>,
    recent_form: Option<f64>,
    win_rate: Option<f64>,
    track_avg: Option<f64>,
    team_rating: Option<f64>,
}

fn build_entry(
    driver: &str,
    track: &str,
    grid: u8,
    weather: &str,
    temperature: f64,
    data: Option<&Path>,
    overrides: EntryOverrides,
) -> Result<RaceEntry> {
    let mut entry = match data {
        Some(path) => {
            let results = f1_predictor::data::load_results_csv(path)
                .with_context(|| format!("Failed to load {:?}", path))?;
            let index = DriverHistoryIndex::from_results(&results);
            match index.entry_for(driver, track, grid, weather, temperature) {
                Some(entry) => entry,
                None => bail!("No history for driver {:?} in {:?}", driver, path),
            }
        }
        None => {
            let (Some(team), Some(recent_form), Some(win_rate), Some(track_avg), Some(team_rating)) = (
                overrides.team.clone(),
                overrides.recent_form,
                overrides.win_rate,
                overrides.track_avg,
                overrides.team_rating,
            ) else {
                bail!(
                    "Without --data, --team, --recent-form, --win-rate, --track-avg and --team-rating are required"
                );
            };
            RaceEntry {
                driver: driver.to_string(),
                team,
                track: track.to_string(),
                grid_position: grid,
                recent_form,
                win_rate,
                track_avg,
                team_rating,
                weather: weather.to_string(),
                temperature,
                dnf_rate: None,
                quali_strength: None,
            }
        }
    };

    if let Some(team) = overrides.team {
        entry.team = team;
    }
    if let Some(v) = overrides.recent_form {
        entry.recent_form = v;
    }
    if let Some(v) = overrides.win_rate {
        entry.win_rate = v;
    }
    if let Some(v) = overrides.track_avg {
        entry.track_avg = v;
    }
    if let Some(v) = overrides.team_rating {
        entry.team_rating = v;
    }
    Ok(entry)
}

fn print_prediction(p: &Prediction) {
    println!(
        "{:<14} {:<14} {:>4} {:>6} {:>9.1}% {:>8} {:>8}",
        p.driver,
        p.track,
        p.grid_position,
        format!("P{}", p.predicted_position),
        p.confidence * 100.0,
        p.win_probability
            .map(|v| format!("{:.1}%", v * 100.0))
            .unwrap_or_else(|| "-".to_string()),
        p.podium_probability
            .map(|v| format!("{:.1}%", v * 100.0))
            .unwrap_or_else(|| "-".to_string()),
    );
}

fn print_header() {
    println!(
        "{:<14} {:<14} {:>4} {:>6} {:>10} {:>8} {:>8}",
        "Driver", "Track", "Grid", "Pred", "Confidence", "Win", "Podium"
    );
    println!("{}", "-".repeat(70));
}

fn predict_single(predictor: &Predictor, entry: &RaceEntry, json: bool) -> Result<()> {
    match predictor.respond(entry) {
        Ok(prediction) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&prediction)?);
            } else {
                println!("{}", "Prediction:".yellow().bold());
                print_header();
                print_prediction(&prediction);
                println!();
                println!("Model: {}", prediction.model_used.cyan());
            }
            Ok(())
        }
        Err(rejected) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&rejected)?);
            } else {
                println!("{} [{}]: {}", "Rejected".red(), rejected.error, rejected.message);
            }
            bail!("prediction rejected: {}", rejected.error)
        }
    }
}

fn predict_batch(predictor: &Predictor, path: &Path, json: bool) -> Result<()> {
    let data = std::fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;
    let entries: Vec<RaceEntry> =
        serde_json::from_str(&data).with_context(|| format!("Invalid entries in {:?}", path))?;

    let outcomes = predictor.predict_batch(&entries);
    if json {
        let values: Vec<serde_json::Value> = outcomes
            .iter()
            .map(|o| match o {
                Ok(p) => serde_json::to_value(p),
                Err(r) => serde_json::to_value(r),
            })
            .collect::<std::result::Result<_, _>>()?;
        println!("{}", serde_json::to_string_pretty(&values)?);
        return Ok(());
    }

    println!("{}", "Batch Predictions:".yellow().bold());
    print_header();
    for outcome in &outcomes {
        match outcome {
            Ok(p) => print_prediction(p),
            Err(r) => println!("{} [{}]: {}", "Rejected".red(), r.error, r.message),
        }
    }
    println!();
    println!("Model: {}", predictor.model_name().cyan());
    Ok(())
}

fn show_models(model_dir: &Path) -> Result<()> {
    let manifest = persistence::read_manifest(model_dir)
        .with_context(|| format!("No trained models in {:?}", model_dir))?;

    println!(
        "{} {}",
        "Trained at:".yellow().bold(),
        manifest.trained_at.to_rfc3339()
    );
    println!();
    println!("{:<24} {:>10} {:>10}  {}", "Model", "Accuracy", "Macro F1", "File");
    println!("{}", "-".repeat(70));
    for entry in &manifest.models {
        let line = format!(
            "{:<24} {:>9.2}% {:>10.4}  {}",
            entry.name,
            entry.accuracy * 100.0,
            entry.macro_f1,
            entry.file
        );
        if entry.name == manifest.best_model {
            println!("{}", line.green());
        } else {
            println!("{}", line);
        }
    }

    let predictor = Predictor::from_dir(model_dir)?;
    println!();
    println!(
        "{} ({})",
        "Feature Importances:".yellow().bold(),
        predictor.model_name()
    );
    for (name, importance) in predictor.feature_importances() {
        let bar = "#".repeat((importance * 50.0).round() as usize);
        println!("{:<18} {:>6.3} {}", name, importance, bar.cyan());
    }
    Ok(())
}
