//! Token-level matching by character n-gram lookup.

use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

use crate::corpus::PriorMatches;
use crate::extract::ComparedFile;
use crate::index::CandidateIndex;
use crate::models::{CandidateSegment, Evidence, SentenceKey, Similarity};
use crate::output::progress_bar;

/// All contiguous `n`-character substrings of `text`, in order.
///
/// Returns nothing when `n` is 0 or longer than the text.
pub fn char_ngrams(text: &str, n: usize) -> Vec<&str> {
    if n == 0 {
        return Vec::new();
    }
    let bounds: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect();
    if bounds.len() <= n {
        return Vec::new();
    }
    bounds.windows(n + 1).map(|w| &text[w[0]..w[n]]).collect()
}

/// Token-level evidence for one canonical sentence, with the keys that
/// order it deterministically.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenMatch {
    pub owner_key: SentenceKey,
    pub insertion_order: usize,
    /// Position of the source file in sorted path order.
    pub file_rank: usize,
    pub evidence: Evidence,
}

impl TokenMatch {
    pub fn sort_key(&self) -> (usize, usize, usize) {
        (self.insertion_order, self.file_rank, self.evidence.source_index)
    }
}

/// Settings for one token-level scan.
#[derive(Debug, Clone)]
pub struct NgramScan<'a> {
    pub sizes: &'a [usize],
    pub verify_text: bool,
}

impl NgramScan<'_> {
    fn min_size(&self) -> usize {
        self.sizes.iter().copied().min().unwrap_or(0)
    }

    /// Match one segment against the index.
    ///
    /// Distinct hashes only: a gram repeated inside the segment yields one
    /// hit per term. With `verify_text`, a term is kept only when one of the
    /// grams under its hash equals its text; otherwise every term in a hit
    /// bucket is emitted. Terms owned by sentences in `claimed` are skipped.
    pub fn match_segment(
        &self,
        index: &CandidateIndex,
        segment: &CandidateSegment,
        file_rank: usize,
        claimed: &PriorMatches,
    ) -> Vec<TokenMatch> {
        let text = segment.raw_text.trim();
        let min = self.min_size();
        if text.is_empty() || min == 0 || text.chars().count() < min {
            return Vec::new();
        }

        let mut hits: BTreeMap<u64, BTreeSet<&str>> = BTreeMap::new();
        for &n in self.sizes {
            for gram in char_ngrams(text, n) {
                let hash = index.hash(gram);
                if index.contains_hash(hash) {
                    hits.entry(hash).or_default().insert(gram);
                }
            }
        }

        let mut out = Vec::new();
        for (hash, grams) in hits {
            for term in index.terms(hash) {
                if self.verify_text && !grams.contains(term.token_text.as_str()) {
                    continue;
                }
                if claimed.contains(&term.owner_key) {
                    continue;
                }
                out.push(TokenMatch {
                    owner_key: term.owner_key.clone(),
                    insertion_order: term.insertion_order,
                    file_rank,
                    evidence: Evidence {
                        representation: term.token_text.clone(),
                        source_file: segment.source_file.clone(),
                        source_index: segment.index_within_file,
                        matched_text: segment.raw_text.clone(),
                        similarity: Similarity::Literal,
                    },
                });
            }
        }
        out
    }

    /// Scan every file in parallel. Results come back in file order.
    pub fn match_files(
        &self,
        index: &CandidateIndex,
        files: &[ComparedFile],
        claimed: &PriorMatches,
        show_progress: bool,
    ) -> Vec<TokenMatch> {
        let progress = progress_bar(files.len(), show_progress, "files");

        let per_file: Vec<Vec<TokenMatch>> = files
            .par_iter()
            .enumerate()
            .map(|(rank, file)| {
                let matches: Vec<TokenMatch> = file
                    .segments
                    .iter()
                    .flat_map(|segment| self.match_segment(index, segment, rank, claimed))
                    .collect();
                debug!(file = %file.source_file, matches = matches.len(), "scanned file");
                if let Some(ref pb) = progress {
                    pb.inc(1);
                }
                matches
            })
            .collect();

        if let Some(pb) = progress {
            pb.finish_and_clear();
        }

        let matches: Vec<TokenMatch> = per_file.into_iter().flatten().collect();
        info!(matches = matches.len(), "token-level scan complete");
        matches
    }
}
