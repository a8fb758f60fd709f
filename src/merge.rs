//! Resolve sentence-level and token-level evidence into final rows.
//!
//! Every canonical sentence gets at least one row. Sentence-level evidence
//! pre-empts token-level evidence; a sentence with neither gets a single
//! row with no evidence.

use std::collections::HashMap;

use crate::corpus::PriorMatches;
use crate::index::CandidateIndex;
use crate::models::{Evidence, MatchParams, MatchRecord, SentenceKey, SentenceMatch, Similarity};
use crate::ngram::TokenMatch;

/// Build the ordered output rows.
///
/// Sentences are visited in `global_order` through the index's order map;
/// their article number and text come from its lookup table. Token-level
/// rows for one sentence are ordered by `(insertion_order, file order,
/// segment index)`.
pub fn resolve(
    index: &CandidateIndex,
    prior: &PriorMatches,
    token_matches: Vec<TokenMatch>,
    params: &MatchParams,
) -> Vec<MatchRecord> {
    let mut by_owner: HashMap<SentenceKey, Vec<TokenMatch>> = HashMap::new();
    for m in token_matches {
        by_owner.entry(m.owner_key.clone()).or_default().push(m);
    }

    let keys: Vec<&SentenceKey> = index
        .keys_in_order()
        .into_iter()
        .filter(|k| params.accepts_author(&k.author))
        .collect();

    let mut records = Vec::with_capacity(keys.len());
    for key in keys {
        let prior_rows = prior.get(key);
        if !prior_rows.is_empty() {
            records.extend(prior_rows.iter().map(sentence_level_record));
            continue;
        }

        let (article_num, original_text) = index.lookup(key).unwrap_or(("", ""));
        match by_owner.remove(key) {
            Some(mut matches) if !matches.is_empty() => {
                matches.sort_by_key(TokenMatch::sort_key);
                records.extend(matches.into_iter().map(|m| {
                    canonical_record(key, article_num, original_text, Some(m.evidence))
                }));
            }
            _ => records.push(canonical_record(key, article_num, original_text, None)),
        }
    }
    records
}

fn canonical_record(
    key: &SentenceKey,
    article_num: &str,
    original_text: &str,
    evidence: Option<Evidence>,
) -> MatchRecord {
    MatchRecord {
        article_num: article_num.to_string(),
        author: key.author.clone(),
        article_title: key.article_title.clone(),
        paragraph_num: key.paragraph_num.clone(),
        group_num: key.group_num.clone(),
        sentence_num: key.sentence_num.clone(),
        original_text: original_text.to_string(),
        evidence,
    }
}

/// A prior match carries its own identity and text.
fn sentence_level_record(m: &SentenceMatch) -> MatchRecord {
    MatchRecord {
        article_num: m.article_num.clone(),
        author: m.author.clone(),
        article_title: m.article_title.clone(),
        paragraph_num: m.paragraph_num.clone(),
        group_num: m.group_num.clone(),
        sentence_num: m.sentence_num.clone(),
        original_text: m.original.clone(),
        evidence: Some(Evidence {
            representation: m.original.clone(),
            source_file: m.matched_file.clone(),
            source_index: m.matched_index,
            matched_text: m.matched.clone(),
            similarity: Similarity::Score(m.similarity),
        }),
    }
}

/// Per-sentence evidence kinds in a resolved row list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvidenceCounts {
    pub sentence_level: usize,
    pub token_level: usize,
    pub none: usize,
}

/// Count distinct sentences by the kind of evidence they ended up with.
pub fn count_evidence(records: &[MatchRecord]) -> EvidenceCounts {
    let mut kinds: HashMap<SentenceKey, u8> = HashMap::new();
    for record in records {
        let kind = if record.is_sentence_level() {
            0
        } else if record.is_token_level() {
            1
        } else {
            2
        };
        kinds.entry(record.key()).or_insert(kind);
    }

    let mut counts = EvidenceCounts::default();
    for kind in kinds.into_values() {
        match kind {
            0 => counts.sentence_level += 1,
            1 => counts.token_level += 1,
            _ => counts.none += 1,
        }
    }
    counts
}
