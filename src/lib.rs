//! Lufu Allusion Detection Library
//!
//! Finds allusions to a canonical corpus of classical Chinese essays in a
//! comparison corpus of plain-text files, at two granularities: whole
//! sentences by token-set Jaccard similarity, and literal reuse of
//! canonical tokens by character n-gram lookup.
//!
//! # Example
//!
//! ```no_run
//! use lufu_allusion::prelude::*;
//! use std::path::Path;
//!
//! let params = MatchParams::default();
//!
//! // Sentence-level pass, then the token-level pass over what it left unclaimed
//! let outcome = run_all_from_paths(
//!     Path::new("data/lufu_tokens.json"),
//!     Path::new("data/compared"),
//!     &params,
//!     false,
//! )
//! .unwrap();
//!
//! for record in outcome.records.iter().take(10) {
//!     println!("{}", format_record(record));
//! }
//! ```
//!
//! # Working on loaded corpora
//!
//! ```no_run
//! use lufu_allusion::prelude::*;
//! use std::path::Path;
//!
//! let params = MatchParams::default();
//! let articles = load_articles(Path::new("data/lufu_tokens.json")).unwrap();
//! let corpus = CanonicalCorpus::from_articles(&articles, &params);
//! let files = load_compared_corpus(
//!     Path::new("data/compared"),
//!     &params.delimiter_set(),
//!     &params.trimmer(),
//!     false,
//! )
//! .unwrap();
//!
//! let prior = load_prior_matches(Path::new("output/sentence_matches.json"), &params).unwrap();
//! let outcome = run_token_pass(&corpus, &files, &prior, &params, false);
//! println!("{} rows", outcome.records.len());
//! ```

pub mod compare;
pub mod config;
pub mod corpus;
pub mod extract;
pub mod index;
pub mod jaccard;
pub mod merge;
pub mod models;
pub mod ngram;
pub mod normalize;
pub mod output;
pub mod segment;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::compare::{
        run_all, run_all_from_paths, run_sentence_pass, run_sentence_pass_from_paths,
        run_token_pass, run_token_pass_from_paths, MatchError, MatchOutcome,
    };
    pub use crate::config::{load_params, parse_params, ConfigError};
    pub use crate::corpus::{
        annotate_tokens, load_articles, load_prior_matches, Article, CanonicalCorpus,
        CorpusError, CorpusStats, Paragraph, PriorMatches, SentenceGroup, SentenceRecord,
    };
    pub use crate::extract::{
        discover_text_files, extract_segments, load_compared_corpus, load_compared_file,
        source_label, split_segments, strip_markup, ComparedFile, DelimiterSet,
        DEFAULT_DELIMITERS,
    };
    pub use crate::index::{term_hash, CandidateIndex, TermHasher};
    pub use crate::jaccard::{
        jaccard_similarity, match_sentences, sort_sentence_matches, CanonicalMatrix,
        IndicatorRow, Vocabulary,
    };
    pub use crate::merge::{count_evidence, resolve, EvidenceCounts};
    pub use crate::models::{
        CandidateSegment, CanonicalSentence, Evidence, MatchParams, MatchRecord, RunSummary,
        SegmenterSpec, SentenceKey, SentenceMatch, Similarity, Term,
    };
    pub use crate::ngram::{char_ngrams, NgramScan, TokenMatch};
    pub use crate::normalize::{
        normalize, AffixTrimmer, TrimRule, DEFAULT_PREFIXES, DEFAULT_SUFFIXES,
    };
    pub use crate::output::{
        format_record, print_corpus_stats, print_records, print_summary, write_articles_file,
        write_records_csv, write_records_csv_file, write_records_json, write_records_json_file,
        write_sentence_matches, write_sentence_matches_file, OutputError,
    };
    pub use crate::segment::{
        build_segmenter, segment_in_batches, BatchError, CharSegmenter, CommandSegmenter,
        SegmentError, Segmenter,
    };
}

// Re-export commonly used types at the crate root
pub use models::{MatchParams, MatchRecord, SentenceKey, SentenceMatch, Similarity};
