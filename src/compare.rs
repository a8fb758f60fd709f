//! Pipeline orchestration.
//!
//! Coordinates loading, the sentence-level pass, the token-level pass and
//! resolution. The `*_from_paths` functions load their inputs from disk;
//! the others work on already-loaded corpora.

use std::path::Path;
use thiserror::Error;
use tracing::info;

use crate::config::ConfigError;
use crate::corpus::{load_articles, load_prior_matches, CanonicalCorpus, CorpusError, PriorMatches};
use crate::extract::{load_compared_corpus, ComparedFile};
use crate::index::CandidateIndex;
use crate::jaccard::{match_sentences, sort_sentence_matches};
use crate::merge::{count_evidence, resolve};
use crate::models::{
    CandidateSegment, CanonicalSentence, MatchParams, MatchRecord, RunSummary, SentenceMatch,
};
use crate::ngram::NgramScan;
use crate::segment::{build_segmenter, segment_in_batches, BatchError, Segmenter};

#[derive(Error, Debug)]
pub enum MatchError {
    #[error(transparent)]
    Corpus(#[from] CorpusError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("segmentation of {side} text failed at {locator}: {source}")]
    Segmentation {
        side: &'static str,
        /// Sentence key or `file#segment` of the first item of the failed batch.
        locator: String,
        #[source]
        source: BatchError,
    },
}

/// Result of a matching run. Fields a pass does not produce stay empty.
#[derive(Debug, Clone, Default)]
pub struct MatchOutcome {
    pub sentence_matches: Vec<SentenceMatch>,
    pub records: Vec<MatchRecord>,
    pub summary: RunSummary,
}

fn segmentation_error(
    side: &'static str,
    source: BatchError,
    locate: impl Fn(usize) -> Option<String>,
) -> MatchError {
    let locator = locate(source.offset).unwrap_or_else(|| "-".to_string());
    MatchError::Segmentation {
        side,
        locator,
        source,
    }
}

/// Sentence-level pass over loaded corpora.
///
/// Canonical sentences and candidate segments whose trimmed text is empty
/// take no part. Matches are sorted by article, paragraph, group and
/// sentence number.
pub fn run_sentence_pass(
    corpus: &CanonicalCorpus,
    files: &[ComparedFile],
    segmenter: &dyn Segmenter,
    params: &MatchParams,
    show_progress: bool,
) -> Result<MatchOutcome, MatchError> {
    let canonical: Vec<&CanonicalSentence> = corpus
        .sentences()
        .iter()
        .filter(|s| params.accepts_author(&s.key.author) && !s.matching_text.is_empty())
        .collect();
    let candidates: Vec<&CandidateSegment> = files
        .iter()
        .flat_map(|f| f.segments.iter())
        .filter(|s| !s.matching_text.is_empty())
        .collect();
    info!(
        canonical = canonical.len(),
        candidates = candidates.len(),
        segmenter = segmenter.name(),
        "starting sentence-level pass"
    );

    let canonical_texts: Vec<String> = canonical.iter().map(|s| s.matching_text.clone()).collect();
    let canonical_tokens = segment_in_batches(
        segmenter,
        &canonical_texts,
        params.segment_batch_size,
        "canonical",
        show_progress,
    )
    .map_err(|e| segmentation_error("canonical", e, |i| canonical.get(i).map(|s| s.key.to_string())))?;

    let candidate_texts: Vec<String> = candidates.iter().map(|s| s.matching_text.clone()).collect();
    let candidate_tokens = segment_in_batches(
        segmenter,
        &candidate_texts,
        params.segment_batch_size,
        "compared",
        show_progress,
    )
    .map_err(|e| {
        segmentation_error("compared", e, |i| {
            candidates
                .get(i)
                .map(|s| format!("{}#{}", s.source_file, s.index_within_file))
        })
    })?;

    let mut matches = match_sentences(
        &canonical,
        &canonical_tokens,
        &candidates,
        &candidate_tokens,
        params.jaccard_threshold,
        params.score_batch_size,
        show_progress,
    );
    sort_sentence_matches(&mut matches);
    info!(matches = matches.len(), "sentence-level pass complete");

    let summary = RunSummary {
        canonical_sentences: canonical.len(),
        compared_files: files.len(),
        compared_segments: candidates.len(),
        sentence_matches: matches.len(),
        ..Default::default()
    };
    Ok(MatchOutcome {
        sentence_matches: matches,
        records: Vec::new(),
        summary,
    })
}

/// Token-level pass and resolution over loaded corpora.
pub fn run_token_pass(
    corpus: &CanonicalCorpus,
    files: &[ComparedFile],
    prior: &PriorMatches,
    params: &MatchParams,
    show_progress: bool,
) -> MatchOutcome {
    info!(
        canonical = corpus.len(),
        files = files.len(),
        claimed = prior.key_count(),
        "starting token-level pass"
    );
    let index = CandidateIndex::build(corpus, prior, &params.stopword_set());

    let scan = NgramScan {
        sizes: &params.ngram_sizes,
        verify_text: params.verify_ngram_text,
    };
    let token_matches = scan.match_files(&index, files, prior, show_progress);
    let token_match_count = token_matches.len();

    let records = resolve(&index, prior, token_matches, params);
    let counts = count_evidence(&records);
    info!(rows = records.len(), "resolution complete");

    let summary = RunSummary {
        canonical_sentences: corpus
            .sentences()
            .iter()
            .filter(|s| params.accepts_author(&s.key.author))
            .count(),
        compared_files: files.len(),
        compared_segments: files.iter().map(|f| f.segments.len()).sum(),
        sentence_matches: prior.len(),
        indexed_terms: index.term_count(),
        token_matches: token_match_count,
        rows: records.len(),
        sentences_with_sentence_evidence: counts.sentence_level,
        sentences_with_token_evidence: counts.token_level,
        sentences_without_evidence: counts.none,
    };
    MatchOutcome {
        sentence_matches: Vec::new(),
        records,
        summary,
    }
}

/// Both passes in one process. Sentence-level matches are handed to the
/// token pass in memory.
pub fn run_all(
    corpus: &CanonicalCorpus,
    files: &[ComparedFile],
    segmenter: &dyn Segmenter,
    params: &MatchParams,
    show_progress: bool,
) -> Result<MatchOutcome, MatchError> {
    let sentence = run_sentence_pass(corpus, files, segmenter, params, show_progress)?;
    let prior = PriorMatches::from_matches(sentence.sentence_matches.iter().cloned(), params);
    let token = run_token_pass(corpus, files, &prior, params, show_progress);

    Ok(MatchOutcome {
        sentence_matches: sentence.sentence_matches,
        records: token.records,
        summary: token.summary,
    })
}

fn load_inputs(
    corpus_path: &Path,
    compared_root: &Path,
    params: &MatchParams,
    show_progress: bool,
) -> Result<(CanonicalCorpus, Vec<ComparedFile>), MatchError> {
    params.validate()?;
    let articles = load_articles(corpus_path)?;
    let corpus = CanonicalCorpus::from_articles(&articles, params);
    let files = load_compared_corpus(
        compared_root,
        &params.delimiter_set(),
        &params.trimmer(),
        show_progress,
    )?;
    Ok((corpus, files))
}

/// Sentence-level pass from a canonical corpus file and a comparison directory.
pub fn run_sentence_pass_from_paths(
    corpus_path: &Path,
    compared_root: &Path,
    params: &MatchParams,
    show_progress: bool,
) -> Result<MatchOutcome, MatchError> {
    let (corpus, files) = load_inputs(corpus_path, compared_root, params, show_progress)?;
    let segmenter = build_segmenter(&params.segmenter);
    run_sentence_pass(&corpus, &files, segmenter.as_ref(), params, show_progress)
}

/// Token-level pass from disk. `prior_path` may point at a missing file.
pub fn run_token_pass_from_paths(
    corpus_path: &Path,
    compared_root: &Path,
    prior_path: &Path,
    params: &MatchParams,
    show_progress: bool,
) -> Result<MatchOutcome, MatchError> {
    let (corpus, files) = load_inputs(corpus_path, compared_root, params, show_progress)?;
    let prior = load_prior_matches(prior_path, params)?;
    Ok(run_token_pass(&corpus, &files, &prior, params, show_progress))
}

pub fn run_all_from_paths(
    corpus_path: &Path,
    compared_root: &Path,
    params: &MatchParams,
    show_progress: bool,
) -> Result<MatchOutcome, MatchError> {
    let (corpus, files) = load_inputs(corpus_path, compared_root, params, show_progress)?;
    let segmenter = build_segmenter(&params.segmenter);
    run_all(&corpus, &files, segmenter.as_ref(), params, show_progress)
}
