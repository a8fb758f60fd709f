//! Candidate index over the canonical corpus.
//!
//! Maps token hashes to the terms that carry them, so the token-level
//! matcher only touches canonical sentences that share an n-gram hash with
//! a comparison segment. Hash collisions between distinct tokens land in
//! the same bucket; ownership is always resolved through the term's key.

use std::collections::{HashMap, HashSet};
use std::fmt;
use tracing::{info, warn};
use xxhash_rust::xxh64::xxh64;

use crate::corpus::{CanonicalCorpus, PriorMatches};
use crate::models::{SentenceKey, Term};

/// Hashes are restricted to 63 bits so they stay positive as signed integers.
pub const HASH_MASK: u64 = 0x7FFF_FFFF_FFFF_FFFF;

/// XXH64 (seed 0) of the UTF-8 bytes, masked to 63 bits.
#[inline]
pub fn term_hash(text: &str) -> u64 {
    xxh64(text.as_bytes(), 0) & HASH_MASK
}

/// Hash function shared by index construction and n-gram lookup.
pub type TermHasher = fn(&str) -> u64;

#[derive(Clone)]
pub struct CandidateIndex {
    hasher: TermHasher,
    order_map: HashMap<SentenceKey, usize>,
    lookup: HashMap<SentenceKey, (String, String)>,
    hash_to_terms: HashMap<u64, Vec<Term>>,
    /// Next `insertion_order` to hand out.
    next_insertion: usize,
}

impl CandidateIndex {
    /// Build the index from every canonical sentence.
    ///
    /// `order_map` and `lookup` cover all sentences. Only tokens of
    /// sentences absent from `claimed` are indexed; stopwords and blank
    /// tokens are skipped.
    pub fn build(
        corpus: &CanonicalCorpus,
        claimed: &PriorMatches,
        stopwords: &HashSet<String>,
    ) -> Self {
        Self::build_with_hasher(corpus, claimed, stopwords, term_hash)
    }

    pub(crate) fn build_with_hasher(
        corpus: &CanonicalCorpus,
        claimed: &PriorMatches,
        stopwords: &HashSet<String>,
        hasher: TermHasher,
    ) -> Self {
        let mut index = Self {
            hasher,
            order_map: HashMap::new(),
            lookup: HashMap::new(),
            hash_to_terms: HashMap::new(),
            next_insertion: 0,
        };
        let mut untokenized = 0usize;
        let mut claimed_skipped = 0usize;

        for sentence in corpus.sentences() {
            index
                .order_map
                .insert(sentence.key.clone(), sentence.global_order);
            index.lookup.insert(
                sentence.key.clone(),
                (sentence.article_num.clone(), sentence.original_text.clone()),
            );

            if claimed.contains(&sentence.key) {
                claimed_skipped += 1;
                continue;
            }
            let Some(tokens) = &sentence.tokens else {
                untokenized += 1;
                continue;
            };
            for token in tokens {
                index.insert_term(token, &sentence.key, stopwords);
            }
        }

        if untokenized > 0 {
            warn!(
                sentences = untokenized,
                "canonical sentences without a token list were not indexed"
            );
        }
        info!(
            terms = index.next_insertion,
            buckets = index.hash_to_terms.len(),
            claimed = claimed_skipped,
            "candidate index built"
        );
        index
    }

    fn insert_term(&mut self, token: &str, owner: &SentenceKey, stopwords: &HashSet<String>) {
        let token = token.trim();
        if token.is_empty() || stopwords.contains(token) {
            return;
        }
        let term = Term {
            token_text: token.to_string(),
            owner_key: owner.clone(),
            insertion_order: self.next_insertion,
        };
        self.next_insertion += 1;
        self.hash_to_terms
            .entry((self.hasher)(token))
            .or_default()
            .push(term);
    }

    /// Hash `text` the way indexed tokens were hashed.
    #[inline]
    pub fn hash(&self, text: &str) -> u64 {
        (self.hasher)(text)
    }

    /// Every canonical sentence key, in `global_order`.
    pub fn keys_in_order(&self) -> Vec<&SentenceKey> {
        let mut keys: Vec<(&SentenceKey, usize)> =
            self.order_map.iter().map(|(k, &o)| (k, o)).collect();
        keys.sort_by_key(|&(_, order)| order);
        keys.into_iter().map(|(k, _)| k).collect()
    }

    pub fn order_of(&self, key: &SentenceKey) -> Option<usize> {
        self.order_map.get(key).copied()
    }

    /// `(article_num, original_text)` of a canonical sentence.
    pub fn lookup(&self, key: &SentenceKey) -> Option<(&str, &str)> {
        self.lookup
            .get(key)
            .map(|(num, text)| (num.as_str(), text.as_str()))
    }

    /// Terms under a hash, in insertion order.
    pub fn terms(&self, hash: u64) -> &[Term] {
        self.hash_to_terms
            .get(&hash)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    #[inline]
    pub fn contains_hash(&self, hash: u64) -> bool {
        self.hash_to_terms.contains_key(&hash)
    }

    pub fn term_count(&self) -> usize {
        self.next_insertion
    }

    pub fn bucket_count(&self) -> usize {
        self.hash_to_terms.len()
    }

    pub fn sentence_count(&self) -> usize {
        self.order_map.len()
    }
}

impl fmt::Debug for CandidateIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CandidateIndex")
            .field("sentences", &self.order_map.len())
            .field("terms", &self.next_insertion)
            .field("buckets", &self.hash_to_terms.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CanonicalSentence, MatchParams, SentenceMatch};

    fn sentence(num: &str, order: usize, tokens: Option<&[&str]>) -> CanonicalSentence {
        CanonicalSentence {
            key: SentenceKey::new("王起", "麗正殿賦", "1", "1", num),
            article_num: "1".into(),
            original_text: format!("句{}", num),
            matching_text: format!("句{}", num),
            tokens: tokens.map(|t| t.iter().map(|s| s.to_string()).collect()),
            global_order: order,
        }
    }

    fn claim(num: &str) -> SentenceMatch {
        SentenceMatch {
            article_num: "1".into(),
            author: "王起".into(),
            article_title: "麗正殿賦".into(),
            paragraph_num: "1".into(),
            group_num: "1".into(),
            sentence_num: num.into(),
            original: String::new(),
            matched_file: "經/書".into(),
            matched_index: 0,
            matched: String::new(),
            similarity: 1.0,
        }
    }

    fn stop(words: &[&str]) -> HashSet<String> {
        words.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_term_hash_is_stable_and_masked() {
        assert_eq!(term_hash("學古"), term_hash("學古"));
        assert_ne!(term_hash("學古"), term_hash("入官"));
        assert_eq!(term_hash("入官") & !HASH_MASK, 0);
        assert_eq!(term_hash(""), xxh64(b"", 0) & HASH_MASK);
    }

    #[test]
    fn test_insertion_order_spans_sentences() {
        let corpus = CanonicalCorpus::from_sentences(vec![
            sentence("1", 0, Some(&["學古", "入官"][..])),
            sentence("2", 1, Some(&["明德"][..])),
        ]);
        let index = CandidateIndex::build(&corpus, &PriorMatches::default(), &stop(&[]));
        assert_eq!(index.term_count(), 3);
        let term = &index.terms(term_hash("明德"))[0];
        assert_eq!(term.insertion_order, 2);
        assert_eq!(term.owner_key.sentence_num, "2");
    }

    #[test]
    fn test_stopwords_and_blank_tokens_skipped() {
        let corpus = CanonicalCorpus::from_sentences(vec![sentence(
            "1",
            0,
            Some(&["若夫", " ", "學古", " 入官 "][..]),
        )]);
        let index = CandidateIndex::build(&corpus, &PriorMatches::default(), &stop(&["若夫"]));
        assert_eq!(index.term_count(), 2);
        assert!(!index.contains_hash(term_hash("若夫")));
        assert_eq!(index.terms(term_hash("入官"))[0].token_text, "入官");
        assert_eq!(index.terms(term_hash("入官"))[0].insertion_order, 1);
    }

    #[test]
    fn test_claimed_sentences_not_indexed_but_ordered() {
        let corpus = CanonicalCorpus::from_sentences(vec![
            sentence("1", 0, Some(&["學古"][..])),
            sentence("2", 1, Some(&["入官"][..])),
        ]);
        let claimed = PriorMatches::from_matches(vec![claim("1")], &MatchParams::default());
        let index = CandidateIndex::build(&corpus, &claimed, &stop(&[]));
        assert!(!index.contains_hash(term_hash("學古")));
        assert!(index.contains_hash(term_hash("入官")));
        assert_eq!(index.terms(term_hash("入官"))[0].insertion_order, 0);

        let key = SentenceKey::new("王起", "麗正殿賦", "1", "1", "1");
        assert_eq!(index.order_of(&key), Some(0));
        assert_eq!(index.lookup(&key), Some(("1", "句1")));
        assert_eq!(index.sentence_count(), 2);
    }

    #[test]
    fn test_untokenized_sentence_still_in_order_map() {
        let corpus = CanonicalCorpus::from_sentences(vec![sentence("1", 0, None)]);
        let index = CandidateIndex::build(&corpus, &PriorMatches::default(), &stop(&[]));
        assert_eq!(index.term_count(), 0);
        assert_eq!(index.bucket_count(), 0);
        assert_eq!(index.sentence_count(), 1);
    }

    #[test]
    fn test_keys_in_order_follow_global_order() {
        let corpus = CanonicalCorpus::from_sentences(vec![
            sentence("3", 2, None),
            sentence("1", 0, None),
            sentence("2", 1, Some(&["明德"][..])),
        ]);
        let index = CandidateIndex::build(&corpus, &PriorMatches::default(), &stop(&[]));
        let nums: Vec<&str> = index
            .keys_in_order()
            .into_iter()
            .map(|k| k.sentence_num.as_str())
            .collect();
        assert_eq!(nums, vec!["1", "2", "3"]);
    }

    #[test]
    fn test_custom_hasher_groups_colliding_tokens() {
        let corpus = CanonicalCorpus::from_sentences(vec![
            sentence("1", 0, Some(&["學古"][..])),
            sentence("2", 1, Some(&["明德"][..])),
        ]);
        let by_len: TermHasher = |t: &str| t.chars().count() as u64;
        let index =
            CandidateIndex::build_with_hasher(&corpus, &PriorMatches::default(), &stop(&[]), by_len);
        assert_eq!(index.bucket_count(), 1);
        assert_eq!(index.hash("入官"), 2);
        assert_eq!(index.terms(2).len(), 2);
    }

    #[test]
    fn test_shared_token_bucket_keeps_order() {
        let corpus = CanonicalCorpus::from_sentences(vec![
            sentence("1", 0, Some(&["天地"][..])),
            sentence("2", 1, Some(&["天地"][..])),
        ]);
        let index = CandidateIndex::build(&corpus, &PriorMatches::default(), &stop(&[]));
        let bucket = index.terms(term_hash("天地"));
        assert_eq!(bucket.len(), 2);
        assert!(bucket[0].insertion_order < bucket[1].insertion_order);
        assert_eq!(index.bucket_count(), 1);
    }
}
