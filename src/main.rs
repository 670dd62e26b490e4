use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::de::DeserializeOwned;
use spherix::{
    ContrastiveConfig, ContrastiveTrainer, EmbeddingSnapshot, EncoderConfig, FidelityScorer,
    HashedTokenEncoder, HashingEmbedder, HypersphericalConfig, HypersphericalTrainer,
    PhraseSelector, RelationMap, SnapshotManager,
};
use spherix_train::Device;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Indicator embedding training and evaluation
#[derive(Parser, Debug)]
#[command(name = "spherix")]
#[command(version, about = "Train and score indicator embeddings", long_about = None)]
struct Cli {
    /// Log level (overridden by RUST_LOG)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Train hyperspherical embeddings from a relation map and report HFS
    Hyper(HyperArgs),
    /// Fine-tune the built-in encoder on phrases, one per line
    Contrastive(ContrastiveArgs),
    /// Select top phrases from a `phrase<TAB>frequency` file
    Select(SelectArgs),
    /// Score a saved snapshot
    Hfs(HfsArgs),
}

#[derive(Args, Debug)]
struct HyperArgs {
    /// JSON relation map: `[{"child": 1, "parents": [0]}, ...]`
    #[arg(short, long)]
    relations: PathBuf,

    /// JSON file with HypersphericalConfig fields
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of indicators (defaults to the largest index + 1)
    #[arg(short, long)]
    num_indicators: Option<usize>,

    #[arg(long)]
    dim: Option<usize>,

    #[arg(long)]
    epochs: Option<usize>,

    #[arg(long)]
    batch_size: Option<usize>,

    #[arg(long)]
    learning_rate: Option<f64>,

    #[arg(long)]
    seed: Option<u64>,

    /// Contrast draws averaged into the reported HFS
    #[arg(long, default_value_t = 1)]
    hfs_rounds: usize,

    /// Snapshot directory to save the trained table into
    #[arg(long)]
    save: Option<PathBuf>,

    /// Snapshot label
    #[arg(long, default_value = "hierarchy")]
    label: String,
}

#[derive(Args, Debug)]
struct ContrastiveArgs {
    /// Text file, one phrase per line
    #[arg(short, long)]
    phrases: PathBuf,

    /// JSON file with ContrastiveConfig fields
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    epochs: Option<usize>,

    #[arg(long)]
    batch_size: Option<usize>,

    #[arg(long)]
    learning_rate: Option<f64>,

    #[arg(long)]
    seed: Option<u64>,

    /// Encoder embedding dimension
    #[arg(long, default_value_t = 64)]
    dim: usize,

    /// Write the tuned encoder here (safetensors)
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct SelectArgs {
    /// `phrase<TAB>frequency` per line
    #[arg(short, long)]
    input: PathBuf,

    #[arg(short = 'n', long, default_value_t = 10)]
    top_n: usize,

    /// Dimension of the hashing embedder
    #[arg(long, default_value_t = 64)]
    dim: usize,
}

#[derive(Args, Debug)]
struct HfsArgs {
    /// Path to a `.snapshot` file
    #[arg(short, long)]
    snapshot: PathBuf,

    #[arg(long, default_value_t = 1)]
    rounds: usize,

    #[arg(long)]
    seed: Option<u64>,
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let data = fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&data).with_context(|| format!("failed to parse {}", path.display()))
}

fn load_config<T: DeserializeOwned + Default>(path: Option<&Path>) -> Result<T> {
    match path {
        Some(path) => read_json(path),
        None => Ok(T::default()),
    }
}

fn rng_from(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    }
}

fn run_hyper(args: HyperArgs) -> Result<()> {
    let relations: RelationMap = read_json(&args.relations)?;
    let mut config: HypersphericalConfig = load_config(args.config.as_deref())?;

    if let Some(n) = args.num_indicators {
        config.num_indicators = n;
    } else if config.num_indicators == 0 {
        config.num_indicators = relations.min_num_indicators();
    }
    if let Some(dim) = args.dim {
        config.dim = dim;
    }
    if let Some(epochs) = args.epochs {
        config.epochs = epochs;
    }
    if let Some(batch_size) = args.batch_size {
        config.batch_size = batch_size;
    }
    if let Some(lr) = args.learning_rate {
        config.learning_rate = lr;
    }
    if args.seed.is_some() {
        config.seed = args.seed;
    }

    let self_loops = relations.self_loops();
    if !self_loops.is_empty() {
        warn!(?self_loops, "self-loop edges will not be scored");
    }

    let mut trainer = HypersphericalTrainer::new(config.clone()).with_relations(relations);
    let table = trainer.train()?;
    let report = trainer.evaluate()?;
    let hfs = if args.hfs_rounds > 1 {
        trainer.compute_hfs_averaged(args.hfs_rounds)?
    } else {
        report.score
    };

    println!(
        "HFS: {:.4} ({} correct / {} evaluated, {} skipped)",
        hfs, report.correct, report.evaluated, report.skipped
    );
    if let Some(loss) = trainer.report().final_loss() {
        println!("final loss: {:.4}", loss);
    }

    if let Some(dir) = args.save {
        let manager = SnapshotManager::new(&dir)?;
        let snapshot = EmbeddingSnapshot::new(args.label, trainer.relations().clone(), table)
            .with_hfs(hfs)
            .with_metadata("config", serde_json::to_value(&config)?)
            .with_metadata("loss", serde_json::to_value(trainer.report())?);
        let desc = manager.save(&snapshot)?;
        println!("saved {}", dir.join(&desc.label).join(&desc.name).display());
    }
    Ok(())
}

fn run_contrastive(args: ContrastiveArgs) -> Result<()> {
    let text = fs::read_to_string(&args.phrases)
        .with_context(|| format!("failed to read {}", args.phrases.display()))?;
    let phrases: Vec<&str> = text.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
    if phrases.is_empty() {
        bail!("no phrases in {}", args.phrases.display());
    }

    let mut config: ContrastiveConfig = load_config(args.config.as_deref())?;
    if let Some(epochs) = args.epochs {
        config.epochs = epochs;
    }
    if let Some(batch_size) = args.batch_size {
        config.batch_size = batch_size;
    }
    if let Some(lr) = args.learning_rate {
        config.learning_rate = lr;
    }
    if args.seed.is_some() {
        config.seed = args.seed;
    }

    let encoder_config = EncoderConfig {
        dim: args.dim,
        max_length: config.max_length,
        seed: config.seed,
        ..Default::default()
    };
    let encoder = HashedTokenEncoder::new(encoder_config, &Device::Cpu)?;
    let mut trainer = ContrastiveTrainer::new(encoder, config)?;
    trainer.train(&phrases)?;

    if let Some(loss) = trainer.report().final_loss() {
        println!("final loss: {:.4}", loss);
    }
    if let Some(path) = args.output {
        trainer.encoder().save(&path)?;
        println!("saved encoder to {}", path.display());
    }
    Ok(())
}

fn run_select(args: SelectArgs) -> Result<()> {
    let text = fs::read_to_string(&args.input)
        .with_context(|| format!("failed to read {}", args.input.display()))?;
    let mut phrases = Vec::new();
    let mut frequencies = Vec::new();
    for (lineno, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let Some((phrase, freq)) = line.rsplit_once('\t') else {
            bail!("line {}: expected `phrase<TAB>frequency`", lineno + 1);
        };
        let freq: f64 = freq
            .trim()
            .parse()
            .with_context(|| format!("line {}: bad frequency '{}'", lineno + 1, freq))?;
        phrases.push(phrase.trim().to_string());
        frequencies.push(freq);
    }

    let selector = PhraseSelector::new(HashingEmbedder::new(args.dim));
    let selected = selector.select_top_phrases(&phrases, &frequencies, args.top_n)?;
    info!(candidates = phrases.len(), selected = selected.len(), "phrase selection");
    for phrase in selected {
        println!("{}", phrase);
    }
    Ok(())
}

fn run_hfs(args: HfsArgs) -> Result<()> {
    let snapshot = SnapshotManager::load_from_path(&args.snapshot)?;
    let mut rng = rng_from(args.seed);
    let scorer = FidelityScorer::new(&snapshot.relations);
    let report = scorer.evaluate(Some(&snapshot.table), &mut rng)?;
    let hfs = if args.rounds > 1 {
        scorer.evaluate_averaged(Some(&snapshot.table), args.rounds, &mut rng)?
    } else {
        report.score
    };
    println!(
        "{}: HFS {:.4} ({} correct / {} evaluated, {} skipped)",
        snapshot.label, hfs, report.correct, report.evaluated, report.skipped
    );
    if let Some(saved) = snapshot.hfs {
        println!("HFS at save time: {:.4}", saved);
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cli.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("spherix v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Command::Hyper(args) => run_hyper(args),
        Command::Contrastive(args) => run_contrastive(args),
        Command::Select(args) => run_select(args),
        Command::Hfs(args) => run_hfs(args),
    }
}
