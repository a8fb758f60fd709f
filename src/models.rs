//! Data structures for the allusion detection pipeline.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;

use crate::extract::{DelimiterSet, DEFAULT_DELIMITERS};
use crate::normalize::{AffixTrimmer, DEFAULT_PREFIXES, DEFAULT_SUFFIXES};

/// Identity of a canonical sentence: author, article, paragraph, group, sentence.
///
/// All five components are whitespace-trimmed strings. Together they are
/// unique within one canonical corpus.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SentenceKey {
    pub author: String,
    pub article_title: String,
    pub paragraph_num: String,
    pub group_num: String,
    pub sentence_num: String,
}

impl SentenceKey {
    pub fn new(
        author: &str,
        article_title: &str,
        paragraph_num: &str,
        group_num: &str,
        sentence_num: &str,
    ) -> Self {
        Self {
            author: author.trim().to_string(),
            article_title: article_title.trim().to_string(),
            paragraph_num: paragraph_num.trim().to_string(),
            group_num: group_num.trim().to_string(),
            sentence_num: sentence_num.trim().to_string(),
        }
    }
}

impl fmt::Display for SentenceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} ¶{} g{} s{}",
            self.author, self.article_title, self.paragraph_num, self.group_num, self.sentence_num
        )
    }
}

/// A sentence of the canonical corpus, flattened out of its article.
#[derive(Debug, Clone)]
pub struct CanonicalSentence {
    pub key: SentenceKey,
    pub article_num: String,
    pub original_text: String,
    /// Normalized and affix-trimmed text used as the sentence-level matching key.
    pub matching_text: String,
    /// `None` when the source record carried no usable token list.
    pub tokens: Option<Vec<String>>,
    /// Position in ingestion order (author → article → paragraph → group → sentence).
    pub global_order: usize,
}

/// A delimiter-bounded span of one comparison-corpus file.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateSegment {
    /// `parent/stem` of the file the segment came from.
    pub source_file: String,
    /// Position in the raw split result, including dropped empty pieces.
    pub index_within_file: usize,
    pub raw_text: String,
    pub matching_text: String,
}

/// One indexed occurrence of a canonical token.
#[derive(Debug, Clone, PartialEq)]
pub struct Term {
    pub token_text: String,
    pub owner_key: SentenceKey,
    pub insertion_order: usize,
}

/// Score attached to a piece of evidence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Similarity {
    /// Jaccard score of a sentence-level match.
    Score(f64),
    /// Literal n-gram reuse; no quantitative score.
    Literal,
}

impl Similarity {
    pub const LITERAL_MARKER: &'static str = "NA";

    pub fn score(&self) -> Option<f64> {
        match self {
            Similarity::Score(s) => Some(*s),
            Similarity::Literal => None,
        }
    }
}

impl fmt::Display for Similarity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Similarity::Score(s) => write!(f, "{}", s),
            Similarity::Literal => f.write_str(Self::LITERAL_MARKER),
        }
    }
}

impl Serialize for Similarity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Similarity::Score(s) => serializer.serialize_f64(*s),
            Similarity::Literal => serializer.serialize_str(Self::LITERAL_MARKER),
        }
    }
}

/// A sentence-level match, as written by the sentence pass and read back
/// as prior evidence by the token pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentenceMatch {
    #[serde(default, deserialize_with = "string_or_number")]
    pub article_num: String,
    #[serde(default, deserialize_with = "string_or_number")]
    pub author: String,
    #[serde(default, deserialize_with = "string_or_number")]
    pub article_title: String,
    #[serde(default, deserialize_with = "string_or_number")]
    pub paragraph_num: String,
    #[serde(default, deserialize_with = "string_or_number")]
    pub group_num: String,
    #[serde(default, deserialize_with = "string_or_number")]
    pub sentence_num: String,
    #[serde(default)]
    pub original: String,
    #[serde(default)]
    pub matched_file: String,
    #[serde(default)]
    pub matched_index: usize,
    #[serde(default)]
    pub matched: String,
    #[serde(default)]
    pub similarity: f64,
}

impl SentenceMatch {
    pub fn key(&self) -> SentenceKey {
        SentenceKey::new(
            &self.author,
            &self.article_title,
            &self.paragraph_num,
            &self.group_num,
            &self.sentence_num,
        )
    }
}

/// Evidence linking a canonical sentence to a comparison-corpus fragment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Evidence {
    /// Matched token (token level) or the canonical sentence itself (sentence level).
    pub representation: String,
    pub source_file: String,
    pub source_index: usize,
    pub matched_text: String,
    pub similarity: Similarity,
}

/// One row of the final output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchRecord {
    pub article_num: String,
    pub author: String,
    pub article_title: String,
    pub paragraph_num: String,
    pub group_num: String,
    pub sentence_num: String,
    pub original_text: String,
    /// `None` for the placeholder row of a sentence without evidence.
    pub evidence: Option<Evidence>,
}

impl MatchRecord {
    pub fn key(&self) -> SentenceKey {
        SentenceKey::new(
            &self.author,
            &self.article_title,
            &self.paragraph_num,
            &self.group_num,
            &self.sentence_num,
        )
    }

    pub fn is_sentence_level(&self) -> bool {
        matches!(
            self.evidence,
            Some(Evidence {
                similarity: Similarity::Score(_),
                ..
            })
        )
    }

    pub fn is_token_level(&self) -> bool {
        matches!(
            self.evidence,
            Some(Evidence {
                similarity: Similarity::Literal,
                ..
            })
        )
    }
}

/// Word-segmentation backend selection.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SegmenterSpec {
    /// One token per non-whitespace character.
    #[default]
    Char,
    /// External program speaking JSON over stdin/stdout.
    Command {
        program: String,
        #[serde(default)]
        args: Vec<String>,
    },
}

/// Matching parameters. Every field has a default; a config file or CLI
/// flags override individual values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchParams {
    /// Restrict every stage to this author. Empty means no restriction.
    pub author: String,
    /// Characters that split comparison text into segments.
    pub delimiters: String,
    pub ngram_sizes: Vec<usize>,
    /// Inclusive lower bound for sentence-level matches.
    pub jaccard_threshold: f64,
    pub segment_batch_size: usize,
    pub score_batch_size: usize,
    pub prefixes: Vec<String>,
    pub suffixes: Vec<String>,
    /// Tokens never indexed for n-gram lookup. Defaults to prefixes ∪ suffixes.
    pub stopwords: Option<Vec<String>>,
    /// Require n-gram text equality on top of the hash bucket hit.
    pub verify_ngram_text: bool,
    pub segmenter: SegmenterSpec,
}

impl Default for MatchParams {
    fn default() -> Self {
        Self {
            author: String::new(),
            delimiters: DEFAULT_DELIMITERS.to_string(),
            ngram_sizes: vec![2, 3, 4],
            jaccard_threshold: 0.7,
            segment_batch_size: 500,
            score_batch_size: 8192,
            prefixes: DEFAULT_PREFIXES.iter().map(|s| s.to_string()).collect(),
            suffixes: DEFAULT_SUFFIXES.iter().map(|s| s.to_string()).collect(),
            stopwords: None,
            verify_ngram_text: true,
            segmenter: SegmenterSpec::Char,
        }
    }
}

impl MatchParams {
    /// The configured author, or `None` when every author is accepted.
    pub fn author_filter(&self) -> Option<&str> {
        let author = self.author.trim();
        if author.is_empty() {
            None
        } else {
            Some(author)
        }
    }

    pub fn accepts_author(&self, author: &str) -> bool {
        match self.author_filter() {
            Some(wanted) => author.trim() == wanted,
            None => true,
        }
    }

    pub fn min_ngram_size(&self) -> usize {
        self.ngram_sizes.iter().copied().min().unwrap_or(0)
    }

    pub fn trimmer(&self) -> AffixTrimmer {
        AffixTrimmer::new(self.prefixes.clone(), self.suffixes.clone())
    }

    pub fn delimiter_set(&self) -> DelimiterSet {
        DelimiterSet::new(&self.delimiters)
    }

    pub fn stopword_set(&self) -> HashSet<String> {
        match &self.stopwords {
            Some(words) => words.iter().map(|w| w.trim().to_string()).collect(),
            None => self
                .prefixes
                .iter()
                .chain(self.suffixes.iter())
                .map(|w| w.trim().to_string())
                .collect(),
        }
    }
}

/// Counts reported after a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunSummary {
    pub canonical_sentences: usize,
    pub compared_files: usize,
    pub compared_segments: usize,
    pub sentence_matches: usize,
    pub indexed_terms: usize,
    pub token_matches: usize,
    pub rows: usize,
    pub sentences_with_sentence_evidence: usize,
    pub sentences_with_token_evidence: usize,
    pub sentences_without_evidence: usize,
}

/// Accept a JSON string or number and return it as a trimmed string.
pub(crate) fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s.trim().to_string()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Null => Ok(String::new()),
        other => Err(D::Error::custom(format!(
            "expected string or number, got {}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentence_key_trims_components() {
        let key = SentenceKey::new(" 王起 ", "麗正殿賦", "1 ", " 2", "3");
        assert_eq!(key.author, "王起");
        assert_eq!(key.paragraph_num, "1");
        assert_eq!(key.group_num, "2");
    }

    #[test]
    fn test_sentence_match_accepts_numbers_and_strings() {
        let json = r#"{
            "article_num": 12, "author": "王起", "article_title": "麗正殿賦",
            "paragraph_num": "1", "group_num": 2, "sentence_num": " 3 ",
            "original": "學古入官", "matched_file": "十三經/尚書",
            "matched_index": 7, "matched": "學古入官", "similarity": 1.0
        }"#;
        let m: SentenceMatch = serde_json::from_str(json).unwrap();
        assert_eq!(m.article_num, "12");
        assert_eq!(m.group_num, "2");
        assert_eq!(m.sentence_num, "3");
        assert_eq!(m.key(), SentenceKey::new("王起", "麗正殿賦", "1", "2", "3"));
    }

    #[test]
    fn test_similarity_serialization() {
        assert_eq!(serde_json::to_string(&Similarity::Score(0.75)).unwrap(), "0.75");
        assert_eq!(serde_json::to_string(&Similarity::Literal).unwrap(), "\"NA\"");
    }

    #[test]
    fn test_similarity_display() {
        assert_eq!(Similarity::Literal.to_string(), "NA");
        assert_eq!(Similarity::Score(1.0).to_string(), "1");
    }

    #[test]
    fn test_author_filter() {
        let params = MatchParams::default();
        assert_eq!(params.author_filter(), None);
        assert!(params.accepts_author("anyone"));

        let params = MatchParams {
            author: " 王起 ".to_string(),
            ..Default::default()
        };
        assert_eq!(params.author_filter(), Some("王起"));
        assert!(params.accepts_author("王起"));
        assert!(!params.accepts_author("白居易"));
    }

    #[test]
    fn test_default_stopwords_are_affixes() {
        let params = MatchParams {
            prefixes: vec!["若夫".into()],
            suffixes: vec!["也".into()],
            ..Default::default()
        };
        let stop = params.stopword_set();
        assert_eq!(stop.len(), 2);
        assert!(stop.contains("若夫"));
        assert!(stop.contains("也"));

        let params = MatchParams {
            stopwords: Some(vec!["之".into()]),
            ..params
        };
        assert_eq!(params.stopword_set().len(), 1);
    }

    #[test]
    fn test_segmenter_spec_from_toml_shape() {
        let spec: SegmenterSpec =
            serde_json::from_str(r#"{"kind": "command", "program": "ckip-seg"}"#).unwrap();
        assert_eq!(
            spec,
            SegmenterSpec::Command {
                program: "ckip-seg".into(),
                args: vec![]
            }
        );
    }
}
