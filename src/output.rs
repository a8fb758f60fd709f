//! Output formatting for match results (JSON, CSV, console).

use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::borrow::Cow;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use thiserror::Error;

use crate::corpus::{Article, CorpusStats};
use crate::models::{MatchParams, MatchRecord, RunSummary, SentenceMatch, Similarity};

#[derive(Error, Debug)]
pub enum OutputError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// CSV header of the final match table.
pub const CSV_HEADER: &str =
    "篇號,賦家,賦篇,段落編號,句組編號,句編號,原始句,tokens,matched_file,matched_index,matched,similarity";

const UTF8_BOM: &str = "\u{feff}";

/// Progress bar for `len` items, or `None` when progress is hidden.
pub fn progress_bar(len: usize, show: bool, unit: &str) -> Option<ProgressBar> {
    if !show {
        return None;
    }
    let pb = ProgressBar::new(len as u64);
    let style = ProgressStyle::with_template(
        "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg} ({per_sec})",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar())
    .progress_chars("#>-");
    pb.set_style(style);
    pb.set_message(unit.to_string());
    Some(pb)
}

/// Create `path` for writing, creating missing parent directories.
fn create_file(path: &Path) -> Result<BufWriter<File>, OutputError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(BufWriter::new(File::create(path)?))
}

/// Write sentence-level matches as pretty JSON.
pub fn write_sentence_matches<W: Write>(
    matches: &[SentenceMatch],
    writer: &mut W,
) -> Result<(), OutputError> {
    let json = serde_json::to_string_pretty(matches)?;
    writer.write_all(json.as_bytes())?;
    Ok(())
}

pub fn write_sentence_matches_file(
    matches: &[SentenceMatch],
    path: &Path,
) -> Result<(), OutputError> {
    let mut file = create_file(path)?;
    write_sentence_matches(matches, &mut file)?;
    file.flush()?;
    Ok(())
}

/// Write the canonical corpus back out, e.g. after token annotation.
pub fn write_articles_file(articles: &[Article], path: &Path) -> Result<(), OutputError> {
    let mut file = create_file(path)?;
    let json = serde_json::to_string_pretty(articles)?;
    file.write_all(json.as_bytes())?;
    file.flush()?;
    Ok(())
}

/// Quote a CSV field when it contains a separator, quote or line break.
pub fn csv_field(value: &str) -> Cow<'_, str> {
    if value.contains(&[',', '"', '\n', '\r'][..]) {
        Cow::Owned(format!("\"{}\"", value.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(value)
    }
}

/// The twelve CSV columns of one record. Match columns are empty for a
/// record without evidence.
fn record_columns(record: &MatchRecord) -> [String; 12] {
    let (representation, file, index, matched, similarity) = match &record.evidence {
        Some(e) => (
            e.representation.clone(),
            e.source_file.clone(),
            e.source_index.to_string(),
            e.matched_text.clone(),
            e.similarity.to_string(),
        ),
        None => Default::default(),
    };
    [
        record.article_num.clone(),
        record.author.clone(),
        record.article_title.clone(),
        record.paragraph_num.clone(),
        record.group_num.clone(),
        record.sentence_num.clone(),
        record.original_text.clone(),
        representation,
        file,
        index,
        matched,
        similarity,
    ]
}

/// Write records as CSV, optionally preceded by a UTF-8 byte order mark.
pub fn write_records_csv<W: Write>(
    records: &[MatchRecord],
    writer: &mut W,
    bom: bool,
) -> Result<(), OutputError> {
    if bom {
        writer.write_all(UTF8_BOM.as_bytes())?;
    }
    writeln!(writer, "{}", CSV_HEADER)?;

    for record in records {
        let columns = record_columns(record);
        let line = columns
            .iter()
            .map(|c| csv_field(c))
            .collect::<Vec<_>>()
            .join(",");
        writeln!(writer, "{}", line)?;
    }
    Ok(())
}

pub fn write_records_csv_file(records: &[MatchRecord], path: &Path) -> Result<(), OutputError> {
    let mut file = create_file(path)?;
    write_records_csv(records, &mut file, true)?;
    file.flush()?;
    Ok(())
}

/// Flat JSON shape of a record.
#[derive(Serialize)]
struct RecordRow<'a> {
    article_num: &'a str,
    author: &'a str,
    article_title: &'a str,
    paragraph_num: &'a str,
    group_num: &'a str,
    sentence_num: &'a str,
    original: &'a str,
    tokens: Option<&'a str>,
    matched_file: Option<&'a str>,
    matched_index: Option<usize>,
    matched: Option<&'a str>,
    similarity: Option<Similarity>,
}

impl<'a> From<&'a MatchRecord> for RecordRow<'a> {
    fn from(record: &'a MatchRecord) -> Self {
        let evidence = record.evidence.as_ref();
        Self {
            article_num: &record.article_num,
            author: &record.author,
            article_title: &record.article_title,
            paragraph_num: &record.paragraph_num,
            group_num: &record.group_num,
            sentence_num: &record.sentence_num,
            original: &record.original_text,
            tokens: evidence.map(|e| e.representation.as_str()),
            matched_file: evidence.map(|e| e.source_file.as_str()),
            matched_index: evidence.map(|e| e.source_index),
            matched: evidence.map(|e| e.matched_text.as_str()),
            similarity: evidence.map(|e| e.similarity),
        }
    }
}

pub fn write_records_json<W: Write>(
    records: &[MatchRecord],
    writer: &mut W,
) -> Result<(), OutputError> {
    let rows: Vec<RecordRow> = records.iter().map(RecordRow::from).collect();
    let json = serde_json::to_string_pretty(&rows)?;
    writer.write_all(json.as_bytes())?;
    Ok(())
}

pub fn write_records_json_file(records: &[MatchRecord], path: &Path) -> Result<(), OutputError> {
    let mut file = create_file(path)?;
    write_records_json(records, &mut file)?;
    file.flush()?;
    Ok(())
}

/// Write a summary report to stdout.
pub fn print_summary(summary: &RunSummary, params: &MatchParams) {
    println!("\n=== Allusion Summary ===");
    println!("Version: {}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("Parameters:");
    println!("  Author filter: {}", params.author_filter().unwrap_or("(all)"));
    println!("  N-gram sizes: {:?}", params.ngram_sizes);
    println!("  Jaccard threshold: {}", params.jaccard_threshold);
    println!("  Verify n-gram text: {}", params.verify_ngram_text);
    println!();
    println!("Inputs:");
    println!("  Canonical sentences: {}", summary.canonical_sentences);
    println!("  Compared files: {}", summary.compared_files);
    println!("  Compared segments: {}", summary.compared_segments);
    println!();
    println!("Results:");
    println!("  Sentence-level matches: {}", summary.sentence_matches);
    println!("  Indexed terms: {}", summary.indexed_terms);
    println!("  Token-level matches: {}", summary.token_matches);
    println!("  Output rows: {}", summary.rows);
    println!(
        "  Sentences with sentence-level evidence: {}",
        summary.sentences_with_sentence_evidence
    );
    println!(
        "  Sentences with token-level evidence: {}",
        summary.sentences_with_token_evidence
    );
    println!("  Sentences without evidence: {}", summary.sentences_without_evidence);
}

pub fn print_corpus_stats(stats: &CorpusStats) {
    println!("=== Canonical Corpus ===");
    println!("Authors: {}", stats.authors);
    println!("Articles: {}", stats.articles);
    println!("Sentences: {}", stats.sentences);
    println!("Tokenized sentences: {}", stats.tokenized_sentences);
    println!("Tokens: {}", stats.tokens);
}

/// Format a record as a human-readable line.
pub fn format_record(record: &MatchRecord) -> String {
    let location = format!(
        "{} {}/{}.{}.{}",
        record.author,
        record.article_title,
        record.paragraph_num,
        record.group_num,
        record.sentence_num
    );
    match &record.evidence {
        Some(e) => format!(
            "{} [{}] {} ← {}#{} ({}) {}",
            location,
            truncate_text(&record.original_text, 40),
            e.representation,
            e.source_file,
            e.source_index,
            e.similarity,
            truncate_text(&e.matched_text, 40),
        ),
        None => format!("{} [{}] -", location, truncate_text(&record.original_text, 40)),
    }
}

/// Print records, at most `limit` of them.
pub fn print_records(records: &[MatchRecord], limit: Option<usize>) {
    let to_print = match limit {
        Some(n) => &records[..n.min(records.len())],
        None => records,
    };

    for record in to_print {
        println!("{}", format_record(record));
    }

    if let Some(n) = limit {
        if records.len() > n {
            println!("... and {} more rows", records.len() - n);
        }
    }
}

/// Truncate text to a maximum number of characters, adding an ellipsis.
fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() <= max_len {
        text.to_string()
    } else {
        let truncated: String = text.chars().take(max_len.saturating_sub(1)).collect();
        format!("{}…", truncated)
    }
}
