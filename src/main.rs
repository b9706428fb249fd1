use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::info;

use review_topics::orchestrator::{RunOutput, TuningOutput};
use review_topics::sources;
use review_topics::{PartitionOrchestrator, TopicConfig};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Fit one topic model per bank and write review-level topic assignments
    Run {
        #[command(flatten)]
        common: CommonArgs,

        #[clap(short, long, default_value = "data/processed/reviews_with_themes_lda.csv")]
        output: PathBuf,

        #[clap(short = 'k', long, help = "Topic count for banks without an override")]
        topics: Option<usize>,

        #[clap(long, help = "JSON map of bank to topic count, e.g. the output of `tune --recommend-out`")]
        topic_overrides: Option<PathBuf>,

        #[clap(long, help = "Write the top words of every topic as JSON")]
        topics_out: Option<PathBuf>,

        #[clap(long, help = "Write the run report (counts, skipped banks) as JSON")]
        report_out: Option<PathBuf>,
    },

    /// Score candidate topic counts per bank by c_v coherence
    Tune {
        #[command(flatten)]
        common: CommonArgs,

        #[clap(short, long, default_value = "data/processed/coherence_scores.csv")]
        output: PathBuf,

        #[clap(long, help = "Smallest candidate topic count")]
        min_topics: Option<usize>,

        #[clap(long, help = "Largest candidate topic count")]
        max_topics: Option<usize>,

        #[clap(long, help = "Write the best topic count per bank as JSON")]
        recommend_out: Option<PathBuf>,
    },
}

#[derive(Args, Debug)]
struct CommonArgs {
    #[clap(short, long, help = "JSON configuration file; missing keys use defaults")]
    config: Option<PathBuf>,

    #[clap(short, long, help = "Input CSV, repeat to give fallbacks in priority order")]
    input: Vec<PathBuf>,

    #[clap(long)]
    seed: Option<u64>,

    #[clap(long)]
    max_iterations: Option<usize>,

    #[clap(long, help = "Keep frequent near-empty words such as 'use' and 'get'")]
    keep_high_frequency: bool,

    #[clap(long, help = "Fit banks one after another instead of in parallel")]
    sequential: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("review_topics=info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            common,
            output,
            topics,
            topic_overrides,
            topics_out,
            report_out,
        } => {
            let mut config = load_config(&common)?;
            if let Some(k) = topics {
                config.default_topic_count = k;
            }
            if let Some(path) = topic_overrides {
                let overrides = read_overrides(&path)?;
                config.topic_overrides.extend(overrides);
            }

            let orchestrator = PartitionOrchestrator::new(config).context("Invalid configuration")?;
            let (source, reviews) = sources::load_reviews(&orchestrator.config().input_sources)?;
            println!("Input: {} ({} reviews)", source.display(), reviews.len());

            let result = orchestrator.run(&reviews)?;
            print_topics(&result);
            print_report(&result);

            sources::write_csv(&output, &result.assignments)
                .with_context(|| format!("Failed to write {}", output.display()))?;
            info!(path = %output.display(), rows = result.assignments.len(), "Wrote topic assignments");

            if let Some(path) = topics_out {
                sources::write_json(&path, &result.topics)
                    .with_context(|| format!("Failed to write {}", path.display()))?;
            }
            if let Some(path) = report_out {
                sources::write_json(&path, &result.report)
                    .with_context(|| format!("Failed to write {}", path.display()))?;
            }
        }
        Commands::Tune {
            common,
            output,
            min_topics,
            max_topics,
            recommend_out,
        } => {
            let mut config = load_config(&common)?;
            let (low, high) = config.tuning_topic_range;
            config.tuning_topic_range = (min_topics.unwrap_or(low), max_topics.unwrap_or(high));

            let orchestrator = PartitionOrchestrator::new(config).context("Invalid configuration")?;
            let (source, reviews) = sources::load_reviews(&orchestrator.config().input_sources)?;
            println!("Input: {} ({} reviews)", source.display(), reviews.len());

            let result = orchestrator.tune(&reviews)?;
            print_tuning(&result);

            sources::write_csv(&output, &result.results)
                .with_context(|| format!("Failed to write {}", output.display()))?;
            info!(path = %output.display(), rows = result.results.len(), "Wrote coherence scores");

            if let Some(path) = recommend_out {
                sources::write_json(&path, &result.recommendations)
                    .with_context(|| format!("Failed to write {}", path.display()))?;
            }
        }
    }

    Ok(())
}

/// Config file first, then command-line overrides.
fn load_config(args: &CommonArgs) -> Result<TopicConfig> {
    let mut config = match &args.config {
        Some(path) => TopicConfig::from_json_file(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?,
        None => TopicConfig::default(),
    };

    if !args.input.is_empty() {
        config.input_sources = args.input.clone();
    }
    if let Some(seed) = args.seed {
        config.seed = seed;
    }
    if let Some(max_iterations) = args.max_iterations {
        config.max_iterations = max_iterations;
    }
    if args.keep_high_frequency {
        config.use_high_frequency_stopwords = false;
    }
    if args.sequential {
        config.parallel = false;
    }

    Ok(config)
}

fn read_overrides(path: &Path) -> Result<BTreeMap<String, usize>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open topic overrides {}", path.display()))?;
    let overrides = serde_json::from_reader(file)
        .with_context(|| format!("Failed to parse topic overrides {}", path.display()))?;
    Ok(overrides)
}

fn print_topics(result: &RunOutput) {
    for (bank, topics) in &result.topics {
        println!("\n=== {} ===", bank);
        for topic in topics {
            let words: Vec<&str> = topic.words.iter().map(|(word, _)| word.as_str()).collect();
            println!("{:<20} {:>4} reviews  {}", topic.name, topic.documents.len(), words.join(", "));
        }
    }
}

fn print_report(result: &RunOutput) {
    let report = &result.report;
    println!("\nAssigned {} of {} reviews", report.assigned, report.input_reviews);
    println!("   Dropped as empty: {}", report.dropped_empty);
    println!("   Skipped: {}", report.skipped);
    for skipped in &report.skipped_partitions {
        println!("   {} skipped ({} reviews): {}", skipped.bank, skipped.review_ids.len(), skipped.reason);
    }
}

fn print_tuning(result: &TuningOutput) {
    println!("\n{:<15} {:>6} {:>10}", "bank", "topics", "coherence");
    for score in &result.results {
        println!("{:<15} {:>6} {:>10.4}", score.bank, score.topic_count, score.coherence_score);
    }

    println!("\nRecommended topic counts:");
    for (bank, k) in &result.recommendations {
        println!("   {}: {}", bank, k);
    }
    for skipped in &result.skipped_partitions {
        println!("   {} skipped: {}", skipped.bank, skipped.reason);
    }
}
