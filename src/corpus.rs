//! Canonical corpus and prior-match loading.
//!
//! The canonical corpus is a JSON array of articles, each nesting
//! paragraphs → sentence groups → sentences. Field names follow the
//! original annotation format (`篇號`, `賦家`, ...) with English aliases.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

use crate::models::{string_or_number, CanonicalSentence, MatchParams, SentenceKey, SentenceMatch};
use crate::normalize::normalize;
use crate::segment::{segment_in_batches, BatchError, Segmenter};

#[derive(Error, Debug)]
pub enum CorpusError {
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid JSON in {}: {source}", .path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("not a directory: {}", .0.display())]
    NotADirectory(PathBuf),
    #[error("directory walk error: {0}")]
    Walk(#[from] walkdir::Error),
}

/// One essay of the canonical corpus.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Article {
    #[serde(rename = "篇號", alias = "article_num", default, deserialize_with = "string_or_number")]
    pub article_num: String,
    #[serde(rename = "賦家", alias = "author", default, deserialize_with = "string_or_number")]
    pub author: String,
    #[serde(rename = "賦篇", alias = "article_title", default, deserialize_with = "string_or_number")]
    pub article_title: String,
    #[serde(rename = "段落", alias = "paragraphs", default)]
    pub paragraphs: Vec<Paragraph>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Paragraph {
    #[serde(rename = "段落編號", alias = "paragraph_num", default, deserialize_with = "string_or_number")]
    pub paragraph_num: String,
    #[serde(rename = "句組", alias = "groups", default)]
    pub groups: Vec<SentenceGroup>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SentenceGroup {
    #[serde(rename = "句組編號", alias = "group_num", default, deserialize_with = "string_or_number")]
    pub group_num: String,
    #[serde(rename = "句子", alias = "sentences", default)]
    pub sentences: Vec<SentenceRecord>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SentenceRecord {
    #[serde(rename = "句編號", alias = "sentence_num", default, deserialize_with = "string_or_number")]
    pub sentence_num: String,
    #[serde(rename = "內容", alias = "content", default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Sentence text under the token-annotation key; used when `內容` is absent.
    #[serde(rename = "原始句", default, skip_serializing_if = "Option::is_none")]
    pub original: Option<String>,
    /// Kept as raw JSON so a malformed token field does not reject the corpus.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens: Option<Value>,
}

impl SentenceRecord {
    /// Trimmed sentence text, preferring `內容` over `原始句`.
    pub fn text(&self) -> &str {
        self.content
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .or_else(|| self.original.as_deref().map(str::trim))
            .unwrap_or("")
    }

    /// The token list, or `None` when absent or not an array.
    /// Non-string array elements are skipped.
    pub fn token_list(&self) -> Option<Vec<String>> {
        match &self.tokens {
            Some(Value::Array(items)) => Some(
                items
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect(),
            ),
            _ => None,
        }
    }
}

/// Read the canonical corpus file.
pub fn load_articles(path: &Path) -> Result<Vec<Article>, CorpusError> {
    let text = std::fs::read_to_string(path).map_err(|source| CorpusError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let articles: Vec<Article> = serde_json::from_str(&text).map_err(|source| CorpusError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    info!(path = %path.display(), articles = articles.len(), "loaded canonical corpus");
    Ok(articles)
}

/// Canonical sentences in ingestion order.
#[derive(Debug, Clone, Default)]
pub struct CanonicalCorpus {
    sentences: Vec<CanonicalSentence>,
}

impl CanonicalCorpus {
    /// Flatten articles into sentences, applying the author filter.
    ///
    /// `global_order` is assigned depth-first (article → paragraph → group
    /// → sentence). A repeated identity key keeps its first occurrence.
    pub fn from_articles(articles: &[Article], params: &MatchParams) -> Self {
        let trimmer = params.trimmer();
        let mut sentences = Vec::new();
        let mut seen: HashSet<SentenceKey> = HashSet::new();
        let mut next_order = 0usize;
        let mut duplicates = 0usize;

        for article in articles {
            if !params.accepts_author(&article.author) {
                continue;
            }
            for paragraph in &article.paragraphs {
                for group in &paragraph.groups {
                    for record in &group.sentences {
                        let key = SentenceKey::new(
                            &article.author,
                            &article.article_title,
                            &paragraph.paragraph_num,
                            &group.group_num,
                            &record.sentence_num,
                        );
                        if !seen.insert(key.clone()) {
                            duplicates += 1;
                            continue;
                        }

                        let normalized = normalize(record.text());
                        sentences.push(CanonicalSentence {
                            key,
                            article_num: article.article_num.trim().to_string(),
                            original_text: normalized.to_string(),
                            matching_text: trimmer.trim(&normalized).to_string(),
                            tokens: record.token_list(),
                            global_order: next_order,
                        });
                        next_order += 1;
                    }
                }
            }
        }

        if duplicates > 0 {
            warn!(duplicates, "duplicate canonical sentence keys ignored");
        }
        info!(sentences = sentences.len(), "canonical corpus ingested");
        Self { sentences }
    }

    pub fn from_sentences(mut sentences: Vec<CanonicalSentence>) -> Self {
        sentences.sort_by_key(|s| s.global_order);
        Self { sentences }
    }

    pub fn sentences(&self) -> &[CanonicalSentence] {
        &self.sentences
    }

    pub fn len(&self) -> usize {
        self.sentences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sentences.is_empty()
    }

    pub fn stats(&self) -> CorpusStats {
        let articles: BTreeSet<(&str, &str)> = self
            .sentences
            .iter()
            .map(|s| (s.key.author.as_str(), s.key.article_title.as_str()))
            .collect();
        let authors: BTreeSet<&str> = articles.iter().map(|(a, _)| *a).collect();
        let tokenized = self.sentences.iter().filter(|s| s.tokens.is_some()).count();

        CorpusStats {
            authors: authors.len(),
            articles: articles.len(),
            sentences: self.sentences.len(),
            tokenized_sentences: tokenized,
            tokens: self
                .sentences
                .iter()
                .filter_map(|s| s.tokens.as_ref())
                .map(|t| t.len())
                .sum(),
        }
    }
}

/// Canonical corpus counts.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CorpusStats {
    pub authors: usize,
    pub articles: usize,
    pub sentences: usize,
    pub tokenized_sentences: usize,
    pub tokens: usize,
}

/// Sentence-level evidence keyed by canonical identity.
///
/// Built once; membership and retrieval are O(1). Entries for one key keep
/// their original list order.
#[derive(Debug, Clone, Default)]
pub struct PriorMatches {
    by_key: HashMap<SentenceKey, Vec<SentenceMatch>>,
    entries: usize,
}

impl PriorMatches {
    pub fn from_matches<I>(matches: I, params: &MatchParams) -> Self
    where
        I: IntoIterator<Item = SentenceMatch>,
    {
        let mut by_key: HashMap<SentenceKey, Vec<SentenceMatch>> = HashMap::new();
        let mut entries = 0;
        for m in matches {
            if !params.accepts_author(&m.author) {
                continue;
            }
            by_key.entry(m.key()).or_default().push(m);
            entries += 1;
        }
        Self { by_key, entries }
    }

    pub fn contains(&self, key: &SentenceKey) -> bool {
        self.by_key.contains_key(key)
    }

    pub fn get(&self, key: &SentenceKey) -> &[SentenceMatch] {
        self.by_key.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Number of match entries kept.
    pub fn len(&self) -> usize {
        self.entries
    }

    /// Number of distinct sentences with sentence-level evidence.
    pub fn key_count(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries == 0
    }
}

/// Load prior sentence-level matches.
///
/// A missing file means no sentence-level evidence; matching proceeds with
/// token-level coverage only.
pub fn load_prior_matches(path: &Path, params: &MatchParams) -> Result<PriorMatches, CorpusError> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            warn!(path = %path.display(), "sentence-level match file not found; skipping sentence-level evidence");
            return Ok(PriorMatches::default());
        }
        Err(source) => {
            return Err(CorpusError::Read {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    let matches: Vec<SentenceMatch> =
        serde_json::from_str(&text).map_err(|source| CorpusError::Json {
            path: path.to_path_buf(),
            source,
        })?;

    let prior = PriorMatches::from_matches(matches, params);
    info!(
        entries = prior.len(),
        sentences = prior.key_count(),
        "loaded sentence-level matches"
    );
    Ok(prior)
}

/// Fill every sentence's `tokens` field by running the segmenter over its
/// normalized content. Articles outside the author filter are left as-is.
///
/// Returns the number of sentences annotated.
pub fn annotate_tokens(
    articles: &mut [Article],
    segmenter: &dyn Segmenter,
    params: &MatchParams,
    show_progress: bool,
) -> Result<usize, BatchError> {
    let texts: Vec<String> = articles
        .iter()
        .filter(|a| params.accepts_author(&a.author))
        .flat_map(|a| a.paragraphs.iter())
        .flat_map(|p| p.groups.iter())
        .flat_map(|g| g.sentences.iter())
        .map(|s| normalize(s.text()).into_owned())
        .collect();

    let tokens = segment_in_batches(
        segmenter,
        &texts,
        params.segment_batch_size,
        "canonical",
        show_progress,
    )?;

    let mut tokens = tokens.into_iter();
    let records = articles
        .iter_mut()
        .filter(|a| params.accepts_author(&a.author))
        .flat_map(|a| a.paragraphs.iter_mut())
        .flat_map(|p| p.groups.iter_mut())
        .flat_map(|g| g.sentences.iter_mut());
    for record in records {
        let list = tokens.next().unwrap_or_default();
        record.tokens = Some(Value::Array(list.into_iter().map(Value::String).collect()));
    }

    Ok(texts.len())
}
