//! rbfnet CLI - RBF Network Classifier
//!
//! Command-line interface for training and using RBF networks.

use clap::{Parser, Subcommand};
use indicatif::{HumanDuration, ProgressBar, ProgressStyle};
use log::error;
use rbfnet::{
    read_dataset, LabelColumn, ProgressSink, RbfClassifier, RbfConfig, RbfError, Result,
};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Instant;

#[derive(Parser)]
#[command(name = "rbfnet")]
#[command(version)]
#[command(about = "RBF network classifier with LVQ-trained prototypes", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Train a network from a labeled sample file
    Train {
        /// Sample file (features followed by an integer label per line)
        #[arg(short, long)]
        input: PathBuf,

        /// Output model file
        #[arg(short, long)]
        output: PathBuf,

        /// JSON configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Random seed for reproducibility (overrides the configuration)
        #[arg(short, long)]
        seed: Option<u64>,

        /// Write the binary format instead of JSON
        #[arg(long)]
        binary: bool,
    },

    /// Classify every sample of a file
    Classify {
        /// Model file (JSON or binary)
        #[arg(short, long)]
        model: PathBuf,

        /// Sample file, labels optional
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Show network statistics
    Info {
        /// Model file (JSON or binary)
        #[arg(short, long)]
        model: PathBuf,
    },
}

/// Progress sink drawing an indicatif bar.
struct BarProgress {
    bar: ProgressBar,
}

impl BarProgress {
    fn new() -> Self {
        let style = ProgressStyle::default_bar()
            .template("{prefix} {msg}\n{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▓▒░  ");
        let bar = ProgressBar::new(0);
        bar.set_style(style);
        Self { bar }
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl ProgressSink for BarProgress {
    fn reset(&mut self) {
        self.bar.reset();
    }

    fn set_title(&mut self, title: &str) {
        self.bar.set_prefix(title.to_string());
    }

    fn set_max_steps(&mut self, steps: u64) {
        self.bar.set_length(steps);
    }

    fn step(&mut self, message: &str) {
        self.bar.set_message(message.to_string());
        self.bar.inc(1);
    }
}

fn main() {
    let cli = Cli::parse();

    // Initialize logging
    if cli.verbose {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    } else {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    }

    let result = match cli.command {
        Commands::Train {
            input,
            output,
            config,
            seed,
            binary,
        } => train_network(input, output, config, seed, binary),

        Commands::Classify { model, input } => classify_file(model, input),

        Commands::Info { model } => show_info(model),
    };

    if let Err(e) = result {
        error!("Error: {}", e);
        std::process::exit(1);
    }
}

fn train_network(
    input: PathBuf,
    output: PathBuf,
    config_path: Option<PathBuf>,
    seed: Option<u64>,
    binary: bool,
) -> Result<()> {
    let start_time = Instant::now();

    let mut config = match config_path {
        Some(path) => RbfConfig::from_json_file(path)?,
        None => RbfConfig::default(),
    };
    if seed.is_some() {
        config.seed = seed;
    }

    println!("rbfnet RBF Network Classifier");
    println!("   Training from: {}", input.display());
    println!();

    let data = read_dataset(&input, LabelColumn::Required)?;
    let labels = data
        .labels
        .ok_or_else(|| RbfError::Parse("training file carries no labels".to_string()))?;
    println!("✓ Loaded {} samples of dimension {}", data.features.nrows(), data.features.ncols());

    let mut rng = match config.seed {
        Some(s) => ChaCha8Rng::seed_from_u64(s),
        None => ChaCha8Rng::from_entropy(),
    };
    let mut net = RbfClassifier::new(config)?;

    let mut progress = BarProgress::new();
    let trained = net.train_with_progress(data.features.view(), &labels, &mut rng, &mut progress);
    progress.finish();

    match trained {
        Ok(()) => println!("✓ Trained network"),
        // The network is usable; some labels will never be predicted
        Err(RbfError::InactiveClasses(inactive)) => {
            println!("! Trained network, but labels {:?} never won on the training set", inactive)
        }
        Err(e) => return Err(e),
    }

    if binary {
        net.save(&output)?;
    } else {
        net.save_json(&output)?;
    }
    println!("✓ Saved network to {}", output.display());

    let correct = data
        .features
        .outer_iter()
        .zip(labels.iter())
        .filter(|(row, label)| net.classify_or_reject(row.view()).winner_label() == Some(**label))
        .count();

    println!();
    println!("Training complete in {}", HumanDuration(start_time.elapsed()));
    println!("   Classes: {}", net.labels().len());
    println!("   Prototypes: {}", net.prototypes()?.nrows());
    println!(
        "   Training accuracy: {:.2}%",
        100.0 * correct as f64 / labels.len().max(1) as f64
    );

    Ok(())
}

fn classify_file(model: PathBuf, input: PathBuf) -> Result<()> {
    let net = load_model(&model)?;
    let data = read_dataset(&input, LabelColumn::Detect { dim: net.input_dim()? })?;

    let mut correct = 0usize;
    for (i, row) in data.features.outer_iter().enumerate() {
        let result = net.classify_or_reject(row);
        let winner = result
            .winner_label()
            .map(|l| l.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{}\t{}\t{:.4}\t{}",
            i,
            winner,
            result.winner_probability(),
            if result.rejected { "rejected" } else { "ok" }
        );

        if let Some(labels) = &data.labels {
            if !result.rejected && result.winner_label() == Some(labels[i]) {
                correct += 1;
            }
        }
    }

    if data.labels.is_some() && !data.is_empty() {
        println!();
        println!(
            "Accuracy: {}/{} ({:.2}%)",
            correct,
            data.len(),
            100.0 * correct as f64 / data.len() as f64
        );
    }

    Ok(())
}

fn show_info(model: PathBuf) -> Result<()> {
    let net = load_model(&model)?;
    let config = net.config();

    println!("RBF network: {}", model.display());
    println!();
    println!("Dimensions:");
    println!("   Input: {}", net.input_dim()?);
    println!("   Classes: {} {:?}", net.labels().len(), net.labels());
    println!("   Prototypes: {} ({} per class)", net.prototypes()?.nrows(), config.hidden_per_class);

    let sigmas = net.sigmas()?;
    if !sigmas.is_empty() {
        let min = sigmas.iter().copied().fold(f64::INFINITY, f64::min);
        let max = sigmas.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        println!("   Sigma range: {:.4} .. {:.4}", min, max);
    }

    println!();
    println!("Configuration:");
    println!("   Initialization: {:?}", config.prototype_init);
    println!("   Distance: {:?}", config.distance);
    let phase = |kind: Option<rbfnet::LvqKind>| kind.map(|k| k.to_string()).unwrap_or_else(|| "none".to_string());
    println!(
        "   Phase A: {} ({} epochs, rate {})",
        phase(config.trainer_a),
        config.presentations_a,
        config.learn_rate_a
    );
    println!(
        "   Phase B: {} ({} epochs, rate {}, factor {}, window {})",
        phase(config.trainer_b),
        config.presentations_b,
        config.learn_rate_b,
        config.learn_factor,
        config.window_size
    );
    println!("   Sigma factor: {}", config.sigma_factor);
    println!("   Lambda: {}", config.lambda);
    println!("   High: {}", config.high);
    println!("   Least squares: {:?}", config.least_squares);

    Ok(())
}

/// Loads a model, picking the binary reader when the file starts with the
/// binary magic number.
fn load_model(path: &Path) -> Result<RbfClassifier> {
    let mut magic = [0u8; 4];
    let is_binary = {
        let mut file = File::open(path)?;
        file.read_exact(&mut magic).is_ok() && &magic == b"RBFN"
    };

    if is_binary {
        RbfClassifier::load(path)
    } else {
        RbfClassifier::load_json(path)
    }
}
