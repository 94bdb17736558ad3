use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use rand::{SeedableRng, rngs::StdRng};
use tracing::{info, level_filters::LevelFilter};

use wopt::bail_assert;
use wopt::blueprint::Blueprint;
use wopt::codec::jxl::JxlCodec;
use wopt::codec;
use wopt::dataset;
use wopt::ga::evaluator::FitnessEvaluator;
use wopt::ga::optimizer::GeneticOptimizer;
use wopt::progress::LogProgress;
use wopt::report::CsvReport;

#[derive(Parser)]
#[clap(version)]
#[command(about = "🧬 wopt - W-OP8 predictor weight search for JPEG XL")]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new wopt project in the current directory, or in a new one if a path is specified
    Init {
        /// Path to initialize in
        #[arg(default_value = ".")]
        path: PathBuf,
    },
    /// Run a weight optimization experiment
    Run {
        /// Path to wopt project directory
        #[arg(default_value = ".")]
        path: PathBuf,
    },
    /// Validate a blueprint file
    Validate {
        /// Blueprint file
        #[arg(default_value = "wopt.toml")]
        blueprint: PathBuf,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = match std::env::var("WOPT_LOG")
        .unwrap_or_else(|_| "INFO".to_string())
        .to_uppercase()
        .as_str()
    {
        "OFF" => LevelFilter::OFF,
        "ERROR" => LevelFilter::ERROR,
        "WARN" => LevelFilter::WARN,
        "INFO" => LevelFilter::INFO,
        "DEBUG" => LevelFilter::DEBUG,
        "TRACE" => LevelFilter::TRACE,
        x => {
            eprintln!("Invalid log level: {}", x);
            eprintln!("Using default log level: INFO");
            LevelFilter::INFO
        }
    };

    tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(log_level)
        .init();

    match args.command {
        Commands::Init { path } => {
            fs::create_dir_all(&path)?;
            fs::write(
                path.join("wopt.toml"),
                include_bytes!("../templates/wopt.toml"),
            )?;
            fs::create_dir_all(path.join("data/input"))?;
            println!(
                "🧬 Initialized wopt project in {}",
                path.canonicalize()?.display()
            );
        }
        Commands::Run { path } => {
            bail_assert!(path.exists(), "No such file or directory: {:?}", &path);
            let blueprint = load_blueprint(&path.join("wopt.toml"))?;
            run(&path, blueprint)?;
        }
        Commands::Validate { blueprint: bpath } => {
            load_blueprint(&bpath)?;
            println!("✅ Blueprint `{}` is valid", bpath.display());
        }
    }

    Ok(())
}

fn load_blueprint(path: &Path) -> Result<Blueprint> {
    let blueprint_s = fs::read_to_string(path)
        .with_context(|| format!("Failed to open blueprint file `{}`", path.display()))?;
    let blueprint: Blueprint = toml::from_str(&blueprint_s)
        .with_context(|| format!("Failed to parse blueprint file `{}`", path.display()))?;
    blueprint.validate()?;
    Ok(blueprint)
}

fn run(project_dir: &Path, mut blueprint: Blueprint) -> Result<()> {
    // Paths in the blueprint are relative to the project, not the cwd
    blueprint.anchor(project_dir);

    let run_dir = blueprint
        .experiment
        .out_dir
        .join(&blueprint.experiment.run_name);

    let images =
        dataset::collect_images(&blueprint.dataset.image_dir, &blueprint.dataset.extensions)?;
    let mut partition_rng = match blueprint.ga.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };
    let (train_paths, test_paths) =
        dataset::partition(images, blueprint.dataset.train_fraction, &mut partition_rng)?;

    let mut codec = JxlCodec::new(
        blueprint.codec.build_dir.clone(),
        blueprint.codec.context_header.clone(),
        blueprint.codec.effort,
    );

    if blueprint.codec.baseline {
        codec.setup_original()?;
        info!("Running baseline compression pass");
        codec::compress_dataset(
            &codec,
            &[
                ("train", train_paths.as_slice()),
                ("test", test_paths.as_slice()),
            ],
            &run_dir.join("baseline"),
            &run_dir.join("baseline.csv"),
            blueprint.codec.measure_error,
        )?;
    }

    // The GA runs against the weighted predictor
    codec.setup_weighted()?;

    let evaluator = FitnessEvaluator::new(
        codec,
        train_paths,
        run_dir.join("candidates"),
        blueprint.codec.measure_error,
    );
    let report = CsvReport::create(&run_dir.join("ga_candidates.csv"))?;

    let mut optimizer = GeneticOptimizer::new(
        blueprint.experiment.run_name.clone(),
        blueprint.ga,
        evaluator,
        run_dir.join("stats"),
        Box::new(LogProgress),
        Box::new(report),
    )?;

    let summary = optimizer.run()?;

    // The winning weights were re-applied during finalization, so the codec
    // is ready to compress the held-out set as-is.
    info!("Compressing held-out test set with the winning weights");
    codec::compress_dataset(
        optimizer.evaluator().codec(),
        &[("test", test_paths.as_slice())],
        &run_dir.join("wop8"),
        &run_dir.join("wop8_test.csv"),
        blueprint.codec.measure_error,
    )?;

    println!("\nOptimization completed!");
    println!("Best weights: {}", summary.best_weights);
    println!("Best fitness: {}", summary.best_fitness);
    println!("Total compression size: {} bytes", summary.total_size);

    Ok(())
}
