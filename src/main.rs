//! Lufu Allusion Detection Pipeline
//!
//! Matches a canonical corpus of classical Chinese essays against a
//! directory of comparison texts at sentence and token level.

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use lufu_allusion::compare::{
    run_all_from_paths, run_sentence_pass_from_paths, run_token_pass_from_paths, MatchOutcome,
};
use lufu_allusion::config::load_params;
use lufu_allusion::corpus::{annotate_tokens, load_articles, CanonicalCorpus};
use lufu_allusion::extract::load_compared_corpus;
use lufu_allusion::models::{MatchParams, SegmenterSpec};
use lufu_allusion::output::{
    print_corpus_stats, print_records, print_summary, write_articles_file,
    write_records_csv_file, write_records_json_file, write_sentence_matches_file,
};
use lufu_allusion::segment::build_segmenter;

#[derive(Parser)]
#[command(name = "lufu-allusion")]
#[command(about = "Allusion detection between classical Chinese essays and a canonical corpus")]
#[command(version)]
struct Cli {
    /// TOML file with matching parameters (flags override it)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Only log warnings and hide progress bars
    #[arg(long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Output format for resolved rows
#[derive(Clone, Copy, Debug, ValueEnum)]
enum OutputFormat {
    /// CSV with a UTF-8 BOM
    Csv,
    /// JSON array of flat rows
    Json,
}

/// Matching parameters. Unset flags fall back to the config file, then to
/// the library defaults.
#[derive(Args, Debug, Default)]
struct MatchArgs {
    /// Restrict every stage to this author
    #[arg(long)]
    author: Option<String>,

    /// Characters that split comparison text into segments
    #[arg(long)]
    delimiters: Option<String>,

    /// N-gram sizes, comma separated [default: 2,3,4]
    #[arg(long, value_delimiter = ',')]
    ngram_sizes: Option<Vec<usize>>,

    /// Inclusive Jaccard threshold [default: 0.7]
    #[arg(long)]
    jaccard_threshold: Option<f64>,

    /// Sentences per segmenter call [default: 500]
    #[arg(long)]
    segment_batch_size: Option<usize>,

    /// Candidates per scoring batch [default: 8192]
    #[arg(long)]
    score_batch_size: Option<usize>,

    /// Require n-gram text equality on hash hits [default: true]
    #[arg(long, action = clap::ArgAction::Set)]
    verify_ngram_text: Option<bool>,

    /// External segmenter program (JSON over stdin/stdout)
    #[arg(long)]
    segmenter_cmd: Option<String>,

    /// Argument passed to the segmenter program (repeatable)
    #[arg(long = "segmenter-arg", allow_hyphen_values = true)]
    segmenter_args: Vec<String>,
}

impl MatchArgs {
    /// Overlay explicitly given flags onto `base`.
    fn apply(self, base: MatchParams) -> MatchParams {
        let segmenter = match self.segmenter_cmd {
            Some(program) => SegmenterSpec::Command {
                program,
                args: self.segmenter_args,
            },
            None => base.segmenter,
        };
        MatchParams {
            author: self.author.unwrap_or(base.author),
            delimiters: self.delimiters.unwrap_or(base.delimiters),
            ngram_sizes: self.ngram_sizes.unwrap_or(base.ngram_sizes),
            jaccard_threshold: self.jaccard_threshold.unwrap_or(base.jaccard_threshold),
            segment_batch_size: self.segment_batch_size.unwrap_or(base.segment_batch_size),
            score_batch_size: self.score_batch_size.unwrap_or(base.score_batch_size),
            verify_ngram_text: self.verify_ngram_text.unwrap_or(base.verify_ngram_text),
            segmenter,
            ..base
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Sentence-level pass: Jaccard matching, written as JSON
    Sentence {
        /// Canonical corpus JSON
        #[arg(long)]
        corpus: PathBuf,

        /// Directory of comparison .txt files
        #[arg(long)]
        compared: PathBuf,

        /// Output JSON path
        #[arg(long, default_value = "output/sentence_matches.json")]
        output: PathBuf,

        #[command(flatten)]
        params: MatchArgs,
    },

    /// Token-level pass over sentences without sentence-level matches, then
    /// resolution into the final table
    Token {
        /// Canonical corpus JSON with token lists
        #[arg(long)]
        corpus: PathBuf,

        /// Directory of comparison .txt files
        #[arg(long)]
        compared: PathBuf,

        /// Sentence-level matches written by `sentence` (may be missing)
        #[arg(long, default_value = "output/sentence_matches.json")]
        sentence_matches: PathBuf,

        /// Output path
        #[arg(long, default_value = "output/allusions.csv")]
        output: PathBuf,

        #[arg(long, value_enum, default_value = "csv")]
        format: OutputFormat,

        /// Print first N rows to console
        #[arg(long)]
        show_rows: Option<usize>,

        #[command(flatten)]
        params: MatchArgs,
    },

    /// Both passes in one process
    Run {
        /// Canonical corpus JSON with token lists
        #[arg(long)]
        corpus: PathBuf,

        /// Directory of comparison .txt files
        #[arg(long)]
        compared: PathBuf,

        /// Output path for the resolved table
        #[arg(long, default_value = "output/allusions.csv")]
        output: PathBuf,

        #[arg(long, value_enum, default_value = "csv")]
        format: OutputFormat,

        /// Also write the sentence-level matches here
        #[arg(long)]
        sentence_output: Option<PathBuf>,

        /// Print first N rows to console
        #[arg(long)]
        show_rows: Option<usize>,

        #[command(flatten)]
        params: MatchArgs,
    },

    /// Add a `tokens` list to every sentence of a canonical corpus
    Tokenize {
        /// Canonical corpus JSON
        #[arg(long)]
        corpus: PathBuf,

        /// Output JSON path
        #[arg(long)]
        output: PathBuf,

        #[command(flatten)]
        params: MatchArgs,
    },

    /// Show corpus statistics
    Stats {
        /// Canonical corpus JSON
        #[arg(long)]
        corpus: PathBuf,

        /// Directory of comparison .txt files
        #[arg(long)]
        compared: Option<PathBuf>,

        #[command(flatten)]
        params: MatchArgs,
    },
}

fn init_tracing(quiet: bool) {
    let default_level = if quiet { "warn" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn resolve_params(
    config: Option<&Path>,
    args: MatchArgs,
) -> Result<MatchParams, Box<dyn std::error::Error>> {
    let params = args.apply(load_params(config)?);
    params.validate()?;
    Ok(params)
}

fn write_table(
    outcome: &MatchOutcome,
    output: &Path,
    format: OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    match format {
        OutputFormat::Csv => write_records_csv_file(&outcome.records, output)?,
        OutputFormat::Json => write_records_json_file(&outcome.records, output)?,
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(cli.quiet);
    let show_progress = !cli.quiet;
    let config = cli.config.as_deref();

    match cli.command {
        Commands::Sentence {
            corpus,
            compared,
            output,
            params,
        } => {
            let params = resolve_params(config, params)?;
            let outcome = run_sentence_pass_from_paths(&corpus, &compared, &params, show_progress)?;
            write_sentence_matches_file(&outcome.sentence_matches, &output)?;

            if !cli.quiet {
                print_summary(&outcome.summary, &params);
                eprintln!("\nOutput: {}", output.display());
            }
        }

        Commands::Token {
            corpus,
            compared,
            sentence_matches,
            output,
            format,
            show_rows,
            params,
        } => {
            let params = resolve_params(config, params)?;
            let outcome = run_token_pass_from_paths(
                &corpus,
                &compared,
                &sentence_matches,
                &params,
                show_progress,
            )?;
            write_table(&outcome, &output, format)?;

            if !cli.quiet {
                print_summary(&outcome.summary, &params);
                eprintln!("\nOutput: {}", output.display());
            }
            if let Some(limit) = show_rows {
                println!("\n=== Sample Rows ===");
                print_records(&outcome.records, Some(limit));
            }
        }

        Commands::Run {
            corpus,
            compared,
            output,
            format,
            sentence_output,
            show_rows,
            params,
        } => {
            let params = resolve_params(config, params)?;
            let outcome = run_all_from_paths(&corpus, &compared, &params, show_progress)?;
            write_table(&outcome, &output, format)?;
            if let Some(ref path) = sentence_output {
                write_sentence_matches_file(&outcome.sentence_matches, path)?;
            }

            if !cli.quiet {
                print_summary(&outcome.summary, &params);
                eprintln!("\nOutput: {}", output.display());
                if let Some(path) = sentence_output {
                    eprintln!("Sentence-level matches: {}", path.display());
                }
            }
            if let Some(limit) = show_rows {
                println!("\n=== Sample Rows ===");
                print_records(&outcome.records, Some(limit));
            }
        }

        Commands::Tokenize {
            corpus,
            output,
            params,
        } => {
            let params = resolve_params(config, params)?;
            let mut articles = load_articles(&corpus)?;
            let segmenter = build_segmenter(&params.segmenter);
            let annotated =
                annotate_tokens(&mut articles, segmenter.as_ref(), &params, show_progress)?;
            write_articles_file(&articles, &output)?;

            if !cli.quiet {
                eprintln!("Annotated {} sentences with {}", annotated, segmenter.name());
                eprintln!("Output: {}", output.display());
            }
        }

        Commands::Stats {
            corpus,
            compared,
            params,
        } => {
            let params = resolve_params(config, params)?;
            let articles = load_articles(&corpus)?;
            let canonical = CanonicalCorpus::from_articles(&articles, &params);
            print_corpus_stats(&canonical.stats());

            if let Some(root) = compared {
                let files = load_compared_corpus(
                    &root,
                    &params.delimiter_set(),
                    &params.trimmer(),
                    show_progress,
                )?;
                println!("\n=== Comparison Corpus ===");
                println!("Files: {}", files.len());
                println!(
                    "Segments: {}",
                    files.iter().map(|f| f.segments.len()).sum::<usize>()
                );
            }
        }
    }

    Ok(())
}
