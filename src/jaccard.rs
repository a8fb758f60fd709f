//! Sentence-level matching by token-set Jaccard similarity.
//!
//! Each sentence becomes a 0/1 indicator row over the canonical vocabulary.
//! Rows are stored sparsely and scored through an inverted index from
//! vocabulary id to canonical rows, so a candidate only visits canonical
//! sentences it shares at least one token with. Every other canonical
//! sentence scores exactly 0 against it.

use rayon::prelude::*;
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::hash::Hash;
use tracing::debug;

use crate::models::{CandidateSegment, CanonicalSentence, SentenceMatch};
use crate::output::progress_bar;

/// `|A∩B| / |A∪B|`, or 0 when both sets are empty.
pub fn jaccard_similarity<T: Eq + Hash>(a: &HashSet<T>, b: &HashSet<T>) -> f64 {
    let intersection = a.intersection(b).count();
    jaccard_from_counts(intersection, a.len(), b.len())
}

#[inline]
pub fn jaccard_from_counts(intersection: usize, size_a: usize, size_b: usize) -> f64 {
    let union = size_a + size_b - intersection;
    if union == 0 {
        0.0
    } else {
        intersection as f64 / union as f64
    }
}

/// Token ids assigned from the canonical side only, in sorted token order.
#[derive(Debug, Clone, Default)]
pub struct Vocabulary {
    ids: HashMap<String, u32>,
}

impl Vocabulary {
    pub fn from_token_lists(lists: &[Vec<String>]) -> Self {
        let sorted: BTreeSet<&str> = lists.iter().flatten().map(String::as_str).collect();
        let ids = sorted
            .into_iter()
            .enumerate()
            .map(|(i, token)| (token.to_string(), i as u32))
            .collect();
        Self { ids }
    }

    pub fn id(&self, token: &str) -> Option<u32> {
        self.ids.get(token).copied()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Sparse 0/1 row: the in-vocabulary ids plus a count of distinct tokens
/// the vocabulary does not know.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndicatorRow {
    ids: Vec<u32>,
    out_of_vocab: usize,
}

impl IndicatorRow {
    pub fn from_tokens(tokens: &[String], vocab: &Vocabulary) -> Self {
        let mut ids = Vec::with_capacity(tokens.len());
        let mut unknown: HashSet<&str> = HashSet::new();
        for token in tokens {
            match vocab.id(token) {
                Some(id) => ids.push(id),
                None => {
                    unknown.insert(token.as_str());
                }
            }
        }
        ids.sort_unstable();
        ids.dedup();
        Self {
            ids,
            out_of_vocab: unknown.len(),
        }
    }

    /// Size of the token set.
    pub fn size(&self) -> usize {
        self.ids.len() + self.out_of_vocab
    }

    pub fn ids(&self) -> &[u32] {
        &self.ids
    }
}

/// Canonical rows with an inverted index for scoring.
#[derive(Debug, Clone, Default)]
pub struct CanonicalMatrix {
    rows: Vec<IndicatorRow>,
    postings: Vec<Vec<u32>>,
}

impl CanonicalMatrix {
    pub fn new(rows: Vec<IndicatorRow>, vocab_size: usize) -> Self {
        let mut postings: Vec<Vec<u32>> = vec![Vec::new(); vocab_size];
        for (row_idx, row) in rows.iter().enumerate() {
            for &id in &row.ids {
                if let Some(list) = postings.get_mut(id as usize) {
                    list.push(row_idx as u32);
                }
            }
        }
        Self { rows, postings }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Best score against every canonical row and the row that achieved it.
    ///
    /// Ties go to the lowest row index. A candidate sharing nothing with any
    /// row scores `(0.0, 0)`.
    pub fn best_match(&self, candidate: &IndicatorRow) -> (f64, usize) {
        let mut shared: HashMap<u32, usize> = HashMap::new();
        for &id in &candidate.ids {
            if let Some(rows) = self.postings.get(id as usize) {
                for &row in rows {
                    *shared.entry(row).or_default() += 1;
                }
            }
        }

        let candidate_size = candidate.size();
        let mut best = (0.0_f64, 0usize);
        for (row, count) in shared {
            let row = row as usize;
            let score = jaccard_from_counts(count, candidate_size, self.rows[row].size());
            match score.partial_cmp(&best.0) {
                Some(Ordering::Greater) => best = (score, row),
                Some(Ordering::Equal) if row < best.1 => best = (score, row),
                _ => {}
            }
        }
        best
    }

    /// Score every candidate, `batch_size` rows at a time. Rows within a
    /// batch are scored in parallel; results keep candidate order.
    pub fn score_all(
        &self,
        candidates: &[IndicatorRow],
        batch_size: usize,
        show_progress: bool,
    ) -> Vec<(f64, usize)> {
        let batch_size = batch_size.max(1);
        let progress = progress_bar(candidates.len(), show_progress, "scored");
        let mut scores = Vec::with_capacity(candidates.len());

        for (batch_idx, batch) in candidates.chunks(batch_size).enumerate() {
            let batch_scores: Vec<(f64, usize)> =
                batch.par_iter().map(|row| self.best_match(row)).collect();
            debug!(batch = batch_idx, size = batch.len(), "scored candidate batch");
            scores.extend(batch_scores);
            if let Some(ref pb) = progress {
                pb.inc(batch.len() as u64);
            }
        }

        if let Some(pb) = progress {
            pb.finish_and_clear();
        }
        scores
    }
}

/// Match every candidate against every canonical sentence and keep the
/// best canonical match of each candidate when it reaches `threshold`.
///
/// `canonical_tokens[i]` belongs to `canonical[i]`, and likewise for the
/// candidate side. Results are in candidate order.
pub fn match_sentences(
    canonical: &[&CanonicalSentence],
    canonical_tokens: &[Vec<String>],
    candidates: &[&CandidateSegment],
    candidate_tokens: &[Vec<String>],
    threshold: f64,
    batch_size: usize,
    show_progress: bool,
) -> Vec<SentenceMatch> {
    if canonical.is_empty() || candidates.is_empty() {
        return Vec::new();
    }

    let vocab = Vocabulary::from_token_lists(canonical_tokens);
    let rows = canonical_tokens
        .iter()
        .map(|t| IndicatorRow::from_tokens(t, &vocab))
        .collect();
    let matrix = CanonicalMatrix::new(rows, vocab.len());
    let candidate_rows: Vec<IndicatorRow> = candidate_tokens
        .iter()
        .map(|t| IndicatorRow::from_tokens(t, &vocab))
        .collect();
    debug!(
        vocabulary = vocab.len(),
        canonical = matrix.len(),
        candidates = candidate_rows.len(),
        "indicator rows built"
    );

    let scores = matrix.score_all(&candidate_rows, batch_size, show_progress);

    candidates
        .iter()
        .zip(scores)
        .filter(|(_, (score, _))| *score >= threshold)
        .filter_map(|(segment, (score, best))| {
            let sentence = canonical.get(best)?;
            Some(SentenceMatch {
                article_num: sentence.article_num.clone(),
                author: sentence.key.author.clone(),
                article_title: sentence.key.article_title.clone(),
                paragraph_num: sentence.key.paragraph_num.clone(),
                group_num: sentence.key.group_num.clone(),
                sentence_num: sentence.key.sentence_num.clone(),
                original: sentence.original_text.clone(),
                matched_file: segment.source_file.clone(),
                matched_index: segment.index_within_file,
                matched: segment.raw_text.clone(),
                similarity: score,
            })
        })
        .collect()
}

/// Numeric field ordering: numbers first in numeric order, then anything
/// else lexicographically.
fn numeric_field_cmp(a: &str, b: &str) -> Ordering {
    match (a.trim().parse::<u64>(), b.trim().parse::<u64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}

/// Stable sort by `(article_num, paragraph_num, group_num, sentence_num)`.
pub fn sort_sentence_matches(matches: &mut [SentenceMatch]) {
    matches.sort_by(|a, b| {
        numeric_field_cmp(&a.article_num, &b.article_num)
            .then_with(|| numeric_field_cmp(&a.paragraph_num, &b.paragraph_num))
            .then_with(|| numeric_field_cmp(&a.group_num, &b.group_num))
            .then_with(|| numeric_field_cmp(&a.sentence_num, &b.sentence_num))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SentenceKey;

    fn set(items: &[&str]) -> HashSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn tokens(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_jaccard_values() {
        assert!((jaccard_similarity(&set(&["a", "b"]), &set(&["a", "c"])) - 1.0 / 3.0).abs() < 1e-12);
        assert_eq!(jaccard_similarity(&set(&["a", "b"]), &set(&["b", "a"])), 1.0);
        assert_eq!(jaccard_similarity(&set(&["a"]), &set(&["b"])), 0.0);
        assert_eq!(jaccard_similarity(&set(&[]), &set(&[])), 0.0);
    }

    #[test]
    fn test_indicator_row_counts_unknown_tokens() {
        let vocab = Vocabulary::from_token_lists(&[tokens(&["a", "b"])]);
        let row = IndicatorRow::from_tokens(&tokens(&["a", "a", "x", "y", "x"]), &vocab);
        assert_eq!(row.ids().len(), 1);
        assert_eq!(row.size(), 3);
    }

    #[test]
    fn test_matrix_matches_set_jaccard() {
        let canon = vec![tokens(&["a", "b"]), tokens(&["a", "c", "d"])];
        let vocab = Vocabulary::from_token_lists(&canon);
        let rows = canon.iter().map(|t| IndicatorRow::from_tokens(t, &vocab)).collect();
        let matrix = CanonicalMatrix::new(rows, vocab.len());

        let cand = tokens(&["a", "c", "z"]);
        let (score, best) = matrix.best_match(&IndicatorRow::from_tokens(&cand, &vocab));
        let expected = jaccard_similarity(&set(&["a", "c", "z"]), &set(&["a", "c", "d"]));
        assert_eq!(best, 1);
        assert!((score - expected).abs() < 1e-12);
    }

    #[test]
    fn test_ties_resolve_to_lowest_index() {
        let canon = vec![tokens(&["x"]), tokens(&["a"]), tokens(&["a"])];
        let vocab = Vocabulary::from_token_lists(&canon);
        let rows = canon.iter().map(|t| IndicatorRow::from_tokens(t, &vocab)).collect();
        let matrix = CanonicalMatrix::new(rows, vocab.len());
        let (score, best) = matrix.best_match(&IndicatorRow::from_tokens(&tokens(&["a"]), &vocab));
        assert_eq!(score, 1.0);
        assert_eq!(best, 1);
    }

    #[test]
    fn test_no_overlap_scores_zero_at_first_row() {
        let canon = vec![tokens(&["a"]), tokens(&["b"])];
        let vocab = Vocabulary::from_token_lists(&canon);
        let rows = canon.iter().map(|t| IndicatorRow::from_tokens(t, &vocab)).collect();
        let matrix = CanonicalMatrix::new(rows, vocab.len());
        assert_eq!(
            matrix.best_match(&IndicatorRow::from_tokens(&tokens(&["q"]), &vocab)),
            (0.0, 0)
        );
    }

    #[test]
    fn test_batch_size_does_not_change_scores() {
        let canon = vec![tokens(&["a", "b"]), tokens(&["c"]), tokens(&["b", "d"])];
        let vocab = Vocabulary::from_token_lists(&canon);
        let rows = canon.iter().map(|t| IndicatorRow::from_tokens(t, &vocab)).collect();
        let matrix = CanonicalMatrix::new(rows, vocab.len());
        let cands: Vec<IndicatorRow> = [&["a"][..], &["c", "d"], &["b", "d"], &["z"], &["a", "b"]]
            .iter()
            .map(|t| IndicatorRow::from_tokens(&tokens(t), &vocab))
            .collect();

        let whole = matrix.score_all(&cands, 100, false);
        for size in [1, 2, 3] {
            assert_eq!(matrix.score_all(&cands, size, false), whole);
        }
    }

    fn canonical(num: &str, text: &str) -> CanonicalSentence {
        CanonicalSentence {
            key: SentenceKey::new("王起", "麗正殿賦", "1", "1", num),
            article_num: "1".into(),
            original_text: text.into(),
            matching_text: text.into(),
            tokens: None,
            global_order: 0,
        }
    }

    fn segment(index: usize, text: &str) -> CandidateSegment {
        CandidateSegment {
            source_file: "十三經/尚書".into(),
            index_within_file: index,
            raw_text: text.into(),
            matching_text: text.into(),
        }
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let canon = [canonical("1", "ABCD")];
        let canon_refs: Vec<&CanonicalSentence> = canon.iter().collect();
        let canon_tokens = vec![tokens(&["A", "B", "C", "D"])];
        // Three shared of four distinct: exactly 0.75.
        let segs = [segment(3, "ABC")];
        let seg_refs: Vec<&CandidateSegment> = segs.iter().collect();
        let seg_tokens = vec![tokens(&["A", "B", "C"])];

        let run = |threshold: f64| {
            match_sentences(&canon_refs, &canon_tokens, &seg_refs, &seg_tokens, threshold, 8, false)
        };

        let hits = run(0.75);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].similarity, 0.75);
        assert_eq!(hits[0].matched_index, 3);
        assert_eq!(hits[0].matched, "ABC");
        assert_eq!(hits[0].original, "ABCD");

        let just_above = f64::from_bits(0.75_f64.to_bits() + 1);
        assert!(run(just_above).is_empty());
    }

    #[test]
    fn test_empty_inputs() {
        assert!(match_sentences(&[], &[], &[], &[], 0.0, 8, false).is_empty());
    }

    fn sm(article: &str, paragraph: &str, sentence: &str) -> SentenceMatch {
        SentenceMatch {
            article_num: article.into(),
            author: "王起".into(),
            article_title: "賦".into(),
            paragraph_num: paragraph.into(),
            group_num: "1".into(),
            sentence_num: sentence.into(),
            original: String::new(),
            matched_file: String::new(),
            matched_index: 0,
            matched: String::new(),
            similarity: 1.0,
        }
    }

    #[test]
    fn test_sort_is_numeric() {
        let mut matches = vec![sm("10", "1", "1"), sm("2", "1", "10"), sm("2", "1", "9"), sm("x", "1", "1")];
        sort_sentence_matches(&mut matches);
        let order: Vec<(&str, &str)> = matches
            .iter()
            .map(|m| (m.article_num.as_str(), m.sentence_num.as_str()))
            .collect();
        assert_eq!(order, vec![("2", "9"), ("2", "10"), ("10", "1"), ("x", "1")]);
    }
}
