use anyhow::Result;
use clap::{Parser, Subcommand};
use podnet::{init_tracing_once, Pipeline, PipelineConfig, DEFAULT_FEATURE_TASKS};
use std::path::PathBuf;
use std::process::ExitCode;

const DEFAULT_CONFIG: &str = "../input/config.toml";

#[derive(Parser, Debug)]
#[clap(name = "podnet", version, about = "Reddit author-interaction networks and block-model communities", long_about = None)]
struct Args {
    /// Pipeline configuration (TOML)
    #[clap(long, global = true, default_value = DEFAULT_CONFIG)]
    config: PathBuf,

    /// Override `[paths] input_dir`
    #[clap(long, global = true)]
    input: Option<PathBuf>,

    /// Override `[paths] output_dir`
    #[clap(long, global = true)]
    output: Option<PathBuf>,

    /// Only process these corpora (repeatable); defaults to every configured subreddit
    #[clap(long, global = true)]
    corpus: Vec<String>,

    /// Disable progress bars
    #[clap(long, global = true)]
    no_progress: bool,

    /// Write log events to this file instead of stderr (no ANSI colours)
    #[clap(long, global = true)]
    log_file: Option<PathBuf>,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, Clone)]
enum Command {
    /// Normalize raw submissions and comments into `{corpus}_merged`
    Merge,
    /// Split posts into `{corpus}_sentences`
    Segment,
    /// Inner-join sentence feature tables on `id_sentence`
    MergeFeatures {
        /// Feature tables to join, in order
        #[clap(long, num_args = 1.., value_delimiter = ',')]
        tasks: Vec<String>,
    },
    /// Build `{corpus}_author_network`
    Network,
    /// Project the network into `{corpus}_vertices` and `{corpus}_edges`
    Project,
    /// Fit the nested block model into `{corpus}_blockmodel`
    Blockmodel,
    /// Edge-wise author text similarity into `{corpus}_ij_similarity`
    Similarity,
    /// Every model-free stage in order
    Run,
}

fn run(args: Args) -> Result<()> {
    let mut cfg = PipelineConfig::load(&args.config)?;
    if !args.corpus.is_empty() {
        cfg = cfg.with_subreddits(&args.corpus);
    }
    let mut pipeline = Pipeline::new(cfg).progress(!args.no_progress);
    if let Some(dir) = &args.input {
        pipeline = pipeline.input_dir(dir);
    }
    if let Some(dir) = &args.output {
        pipeline = pipeline.output_dir(dir);
    }
    tracing::info!(
        analysis = %pipeline.config().analysis_id,
        corpora = ?pipeline.corpora(),
        command = ?args.command,
        "podnet starting"
    );

    for corpus in pipeline.corpora() {
        match &args.command {
            Command::Merge => {
                pipeline.merge_submissions_and_comments(corpus)?;
            }
            Command::Segment => {
                pipeline.segment_sentences(corpus)?;
            }
            Command::MergeFeatures { tasks } => {
                let tasks: Vec<String> = if tasks.is_empty() {
                    DEFAULT_FEATURE_TASKS.iter().map(|t| t.to_string()).collect()
                } else {
                    tasks.clone()
                };
                pipeline.merge_sentence_features(corpus, &tasks)?;
            }
            Command::Network => {
                pipeline.construct_network(corpus)?;
            }
            Command::Project => {
                pipeline.construct_similarity_datasets(corpus)?;
            }
            Command::Blockmodel => {
                let fit = pipeline.blockmodel(corpus)?;
                if fit.is_degenerate() {
                    tracing::warn!(corpus = %corpus, "block model found no community structure");
                }
            }
            Command::Similarity => {
                pipeline.ij_similarities(corpus)?;
            }
            Command::Run => pipeline.run(corpus)?,
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing_once(args.log_file.as_deref());
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e:#}");
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
