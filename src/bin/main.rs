//! align_engine: scores how well a target translation covers its source,
//! word by word and verse by verse.

use align_core::detector::Baseline;
use align_core::{tables, AlignError, AlignmentEngine, AssessmentInputs, EngineConfig};
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use crossterm::style::Stylize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "align_engine", version, about = "Word-alignment scoring for verse-aligned corpora")]
struct Cli {
    /// TOML config file; CLI flags override its values
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Cache directory
    #[arg(long, global = true, env = "VERSE_ALIGN_CACHE_DIR")]
    cache_dir: Option<PathBuf>,

    /// Rebuild cached indexes and match scores
    #[arg(long, global = true)]
    refresh: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Score a target against its source and write the score tables
    Assess {
        #[command(flatten)]
        corpus: CorpusArgs,
        /// Per-verse aligner output (CSV)
        #[arg(long)]
        alignments: PathBuf,
        /// Corpus-level best alignments (CSV)
        #[arg(long)]
        best_alignments: PathBuf,
        /// Translation scores (CSV)
        #[arg(long)]
        translations: PathBuf,
        /// Pretrained projection weights, one matrix row per line
        #[arg(long)]
        weights: PathBuf,
        #[arg(long)]
        jaccard_threshold: Option<f64>,
        #[arg(long)]
        count_threshold: Option<u32>,
        /// Output directory
        #[arg(long, default_value = ".")]
        out: PathBuf,
    },
    /// Build (or refresh) the word indexes and match dictionary only
    Index {
        #[command(flatten)]
        corpus: CorpusArgs,
        #[arg(long)]
        jaccard_threshold: Option<f64>,
        #[arg(long)]
        count_threshold: Option<u32>,
    },
    /// Flag source words a target misses that baseline translations render
    Flag {
        /// Top-source score table of the target
        #[arg(long)]
        scores: PathBuf,
        /// Baseline top-source table as ID=PATH; repeatable
        #[arg(long = "baseline", value_parser = parse_baseline)]
        baselines: Vec<(String, PathBuf)>,
        /// Baseline id of the target itself, excluded from the reference set
        #[arg(long)]
        target_revision: Option<String>,
        #[arg(long)]
        threshold: Option<f64>,
        #[arg(long, default_value = ".")]
        out: PathBuf,
    },
}

#[derive(Args, Debug)]
struct CorpusArgs {
    /// Source text, one verse per line
    #[arg(long)]
    source: PathBuf,
    /// Target text, line-aligned with the source
    #[arg(long)]
    target: PathBuf,
    /// Verse references, one per line
    #[arg(long)]
    vrefs: Option<PathBuf>,
    /// Require the canonical scripture line count
    #[arg(long)]
    bible: bool,
}

fn parse_baseline(arg: &str) -> std::result::Result<(String, PathBuf), String> {
    match arg.split_once('=') {
        Some((id, path)) if !id.is_empty() && !path.is_empty() => {
            Ok((id.to_string(), PathBuf::from(path)))
        }
        _ => Err(format!("expected ID=PATH, got '{}'", arg)),
    }
}

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            match err.downcast_ref::<AlignError>() {
                Some(align) => eprintln!("{} [{}] {:#}", "error".red().bold(), align.stage(), err),
                None => eprintln!("{} {:#}", "error".red().bold(), err),
            }
            ExitCode::FAILURE
        }
    }
}

fn load_config(cli: &Cli) -> Result<EngineConfig> {
    let mut config = EngineConfig::load(cli.config.as_deref()).context("loading configuration")?;
    if let Some(dir) = &cli.cache_dir {
        config.cache_dir = dir.clone();
    }
    config.refresh |= cli.refresh;
    Ok(config)
}

fn apply_thresholds(config: &mut EngineConfig, jaccard: Option<f64>, count: Option<u32>) -> Result<()> {
    if let Some(j) = jaccard {
        config.jaccard_threshold = j;
    }
    if let Some(c) = count {
        config.count_threshold = c;
    }
    config.validate()?;
    Ok(())
}

fn ensure_dir(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))
}

fn run(cli: Cli) -> Result<()> {
    let mut config = load_config(&cli)?;

    match cli.command {
        Command::Assess {
            corpus,
            alignments,
            best_alignments,
            translations,
            weights,
            jaccard_threshold,
            count_threshold,
            out,
        } => {
            apply_thresholds(&mut config, jaccard_threshold, count_threshold)?;
            config.is_bible |= corpus.bible;
            let engine = AlignmentEngine::new(config);
            let inputs = AssessmentInputs {
                source: &corpus.source,
                target: &corpus.target,
                vrefs: corpus.vrefs.as_deref(),
                alignments: &alignments,
                best_alignments: &best_alignments,
                translations: &translations,
                weights: &weights,
            };
            let assessment = engine.assess(&inputs)?;
            ensure_dir(&out)?;
            assessment.publish(&out)?;

            let defined: Vec<f64> = assessment.top_source.iter().filter_map(|t| t.total_score).collect();
            let mean = if defined.is_empty() { 0.0 } else { defined.iter().sum::<f64>() / defined.len() as f64 };
            println!("{}", "Assessment complete".green().bold());
            println!("  verses scored:   {}", assessment.verses.len());
            println!("  source words:    {}", assessment.top_source.len());
            println!("  pairings:        {}", assessment.scores.len());
            println!("  mean word score: {:.4}", mean);
            println!("  written to:      {}", out.display());
        }
        Command::Index { corpus, jaccard_threshold, count_threshold } => {
            apply_thresholds(&mut config, jaccard_threshold, count_threshold)?;
            config.is_bible |= corpus.bible;
            let engine = AlignmentEngine::new(config);
            let prepared = engine.prepare(&corpus.source, &corpus.target, corpus.vrefs.as_deref())?;
            let (source_index, target_index) = engine.indexes(&prepared)?;
            let matches = engine.match_corpus(&prepared, &source_index, &target_index)?;

            println!("{}", "Index ready".green().bold());
            println!("  source: {} ({} words)", prepared.source_id, source_index.len());
            println!("  target: {} ({} words)", prepared.target_id, target_index.len());
            println!("  matched source words: {}", matches.len());
            println!("  cache: {}", engine.config().cache_dir.display());
        }
        Command::Flag { scores, baselines, target_revision, threshold, out } => {
            if let Some(t) = threshold {
                config.missing_threshold = t;
                config.validate()?;
            }
            if baselines.is_empty() {
                tracing::warn!("No --baseline given; nothing can be flagged");
            }
            let target = tables::read_top_scores(&scores)
                .with_context(|| format!("reading target scores {}", scores.display()))?;
            let baselines = baselines
                .into_iter()
                .map(|(id, path)| {
                    let scores = tables::read_top_scores(&path)
                        .with_context(|| format!("reading baseline '{}' from {}", id, path.display()))?;
                    Ok(Baseline { id, scores })
                })
                .collect::<Result<Vec<_>>>()?;

            let engine = AlignmentEngine::new(config);
            let flagged = engine.flag_missing(&target, &baselines, target_revision.as_deref());
            ensure_dir(&out)?;
            engine.publish_flags(&flagged, &out)?;

            let red = flagged.iter().filter(|f| f.flag).count();
            println!("{}", "Missing-word check complete".green().bold());
            println!("  low-scoring words: {}", flagged.len());
            let summary = format!("  red flags:         {}", red);
            if red > 0 {
                println!("{}", summary.yellow());
            } else {
                println!("{}", summary);
            }
        }
    }
    Ok(())
}
