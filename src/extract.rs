//! Comparison-corpus segment extraction.
//!
//! Turns raw comparison files into delimiter-bounded candidate segments.
//! Segment indices are positions in the raw split result, so dropping an
//! empty piece never renumbers the pieces after it.

use rayon::prelude::*;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::corpus::CorpusError;
use crate::models::CandidateSegment;
use crate::normalize::{normalize, AffixTrimmer};
use crate::output::progress_bar;

/// Punctuation, brackets, whitespace and ASCII digits.
pub const DEFAULT_DELIMITERS: &str =
    "﹔。，、：；！？（）〔〕「」[]『』《》〈〉\\#-－()/ ,.:;!?~1234567890¶";

/// Character class used to split comparison text.
#[derive(Debug, Clone)]
pub struct DelimiterSet {
    chars: HashSet<char>,
}

impl DelimiterSet {
    pub fn new(delimiters: &str) -> Self {
        Self {
            chars: delimiters.chars().collect(),
        }
    }

    #[inline]
    pub fn contains(&self, c: char) -> bool {
        self.chars.contains(&c)
    }

    /// Split on every delimiter. Adjacent delimiters yield empty pieces.
    pub fn split<'a>(&'a self, text: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        text.split(move |c: char| self.contains(c))
    }
}

impl Default for DelimiterSet {
    fn default() -> Self {
        Self::new(DEFAULT_DELIMITERS)
    }
}

/// A comparison file split into segments.
#[derive(Debug, Clone)]
pub struct ComparedFile {
    pub path: PathBuf,
    pub source_file: String,
    pub segments: Vec<CandidateSegment>,
}

/// Remove `<...>` markup spans. An unclosed `<` is kept as text.
pub fn strip_markup(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(open) = rest.find('<') {
        match rest[open..].find('>') {
            Some(close) => {
                out.push_str(&rest[..open]);
                rest = &rest[open + close + 1..];
            }
            None => break,
        }
    }
    out.push_str(rest);
    out
}

/// Normalize, drop newlines, strip markup, split, and keep non-blank pieces
/// with their raw split positions.
pub fn split_segments(content: &str, delimiters: &DelimiterSet) -> Vec<(usize, String)> {
    let normalized = normalize(content);
    let flat: String = normalized
        .chars()
        .filter(|&c| c != '\n' && c != '\r')
        .collect();
    let cleaned = strip_markup(&flat);

    delimiters
        .split(&cleaned)
        .enumerate()
        .filter_map(|(idx, piece)| {
            let piece = piece.trim();
            if piece.is_empty() {
                None
            } else {
                Some((idx, piece.to_string()))
            }
        })
        .collect()
}

/// Build candidate segments for one file's content.
pub fn extract_segments(
    source_file: &str,
    content: &str,
    delimiters: &DelimiterSet,
    trimmer: &AffixTrimmer,
) -> Vec<CandidateSegment> {
    split_segments(content, delimiters)
        .into_iter()
        .map(|(index_within_file, raw_text)| {
            let matching_text = trimmer.trim(&raw_text).to_string();
            CandidateSegment {
                source_file: source_file.to_string(),
                index_within_file,
                raw_text,
                matching_text,
            }
        })
        .collect()
}

/// Logical locator of a comparison file: `parent/stem`.
pub fn source_label(path: &Path) -> String {
    let parent = path
        .parent()
        .and_then(|p| p.file_name())
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    if parent.is_empty() {
        stem
    } else {
        format!("{}/{}", parent, stem)
    }
}

/// Find every `.txt` file under `root`, sorted by path.
pub fn discover_text_files(root: &Path) -> Result<Vec<PathBuf>, CorpusError> {
    if !root.is_dir() {
        return Err(CorpusError::NotADirectory(root.to_path_buf()));
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(root).follow_links(true) {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type().is_file() && path.extension().is_some_and(|ext| ext == "txt") {
            files.push(path.to_path_buf());
        }
    }
    files.sort();
    Ok(files)
}

/// Read and segment one comparison file.
pub fn load_compared_file(
    path: &Path,
    delimiters: &DelimiterSet,
    trimmer: &AffixTrimmer,
) -> Result<ComparedFile, CorpusError> {
    let content = std::fs::read_to_string(path).map_err(|source| CorpusError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let source_file = source_label(path);
    let segments = extract_segments(&source_file, &content, delimiters, trimmer);
    debug!(file = %path.display(), segments = segments.len(), "segmented comparison file");

    Ok(ComparedFile {
        path: path.to_path_buf(),
        source_file,
        segments,
    })
}

/// Discover and segment the whole comparison corpus in parallel.
///
/// Files come back in sorted path order regardless of scheduling.
pub fn load_compared_corpus(
    root: &Path,
    delimiters: &DelimiterSet,
    trimmer: &AffixTrimmer,
    show_progress: bool,
) -> Result<Vec<ComparedFile>, CorpusError> {
    let paths = discover_text_files(root)?;
    info!(root = %root.display(), files = paths.len(), "scanning comparison corpus");

    let progress = progress_bar(paths.len(), show_progress, "files");
    let files = paths
        .par_iter()
        .map(|path| {
            let file = load_compared_file(path, delimiters, trimmer);
            if let Some(ref pb) = progress {
                pb.inc(1);
            }
            file
        })
        .collect::<Result<Vec<_>, _>>();

    if let Some(pb) = progress {
        pb.finish_and_clear();
    }

    let files = files?;
    let segment_count: usize = files.iter().map(|f| f.segments.len()).sum();
    info!(files = files.len(), segments = segment_count, "comparison corpus loaded");
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_markup() {
        assert_eq!(strip_markup("學<b>古</b>入官"), "學古入官");
        assert_eq!(strip_markup("<p attr=\"x\">文</p>"), "文");
        assert_eq!(strip_markup("a<b<c>d"), "ad");
        assert_eq!(strip_markup("未閉<合"), "未閉<合");
    }

    #[test]
    fn test_split_preserves_raw_indices() {
        let d = DelimiterSet::default();
        let segs = split_segments("學古。。入官，", &d);
        // raw split: ["學古", "", "入官", ""]
        assert_eq!(segs, vec![(0, "學古".to_string()), (2, "入官".to_string())]);
    }

    #[test]
    fn test_split_removes_newlines_before_splitting() {
        let d = DelimiterSet::default();
        let segs = split_segments("學古\n入官。此言", &d);
        assert_eq!(segs[0], (0, "學古入官".to_string()));
        assert_eq!(segs[1], (1, "此言".to_string()));
    }

    #[test]
    fn test_split_on_digits_and_fullwidth_punct() {
        let d = DelimiterSet::default();
        // The fullwidth comma folds to ',' under NFKC; both are delimiters.
        let segs: Vec<String> = split_segments("卷1學古，入官《書》", &d)
            .into_iter()
            .map(|(_, s)| s)
            .collect();
        assert_eq!(segs, vec!["卷", "學古", "入官", "書"]);
    }

    #[test]
    fn test_markup_stripped_after_newline_removal() {
        let d = DelimiterSet::default();
        let segs = split_segments("學<note\n>x</note>古", &d);
        assert_eq!(segs, vec![(0, "學x古".to_string())]);
    }

    #[test]
    fn test_extract_segments_trims_matching_text() {
        let d = DelimiterSet::default();
        let t = AffixTrimmer::with_defaults();
        let segs = extract_segments("書/尚書", "若夫學古入官。", &d, &t);
        assert_eq!(segs.len(), 1);
        assert_eq!(segs[0].raw_text, "若夫學古入官");
        assert_eq!(segs[0].matching_text, "學古入官");
        assert_eq!(segs[0].source_file, "書/尚書");
        assert_eq!(segs[0].index_within_file, 0);
    }

    #[test]
    fn test_source_label() {
        assert_eq!(source_label(Path::new("/data/十三經/尚書.txt")), "十三經/尚書");
        assert_eq!(source_label(Path::new("尚書.txt")), "尚書");
    }
}
