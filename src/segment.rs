//! Word segmentation backends.
//!
//! A segmenter turns a batch of strings into one token list per string,
//! preserving order. The built-in `CharSegmenter` needs no external model;
//! `CommandSegmenter` delegates to any program that reads a JSON array of
//! strings on stdin and writes a JSON array of string arrays on stdout.

use std::io::{self, Write};
use std::process::{Command, ExitStatus, Stdio};
use std::thread;
use thiserror::Error;
use tracing::debug;

use crate::models::SegmenterSpec;
use crate::output::progress_bar;

#[derive(Error, Debug)]
pub enum SegmentError {
    #[error("failed to start segmenter `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("segmenter I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("segmenter `{program}` exited with {status}: {stderr}")]
    Exit {
        program: String,
        status: ExitStatus,
        stderr: String,
    },
    #[error("segmenter JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("segmenter returned {got} token lists for {expected} inputs")]
    LengthMismatch { expected: usize, got: usize },
}

/// A segmentation failure located within a larger input sequence.
#[derive(Error, Debug)]
#[error("{segmenter} segmenter failed on batch starting at item {offset}: {source}")]
pub struct BatchError {
    pub segmenter: String,
    /// Index of the first input of the failed batch.
    pub offset: usize,
    #[source]
    pub source: SegmentError,
}

pub trait Segmenter: Send + Sync {
    fn name(&self) -> &str;

    /// Segment every input. The result has exactly one list per input.
    fn segment(&self, batch: &[String]) -> Result<Vec<Vec<String>>, SegmentError>;
}

/// One token per non-whitespace character.
#[derive(Debug, Clone, Copy, Default)]
pub struct CharSegmenter;

impl Segmenter for CharSegmenter {
    fn name(&self) -> &str {
        "char"
    }

    fn segment(&self, batch: &[String]) -> Result<Vec<Vec<String>>, SegmentError> {
        Ok(batch
            .iter()
            .map(|text| {
                text.chars()
                    .filter(|c| !c.is_whitespace())
                    .map(String::from)
                    .collect()
            })
            .collect())
    }
}

/// External segmenter process, spawned once per batch.
#[derive(Debug, Clone)]
pub struct CommandSegmenter {
    program: String,
    args: Vec<String>,
}

impl CommandSegmenter {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

impl Segmenter for CommandSegmenter {
    fn name(&self) -> &str {
        &self.program
    }

    fn segment(&self, batch: &[String]) -> Result<Vec<Vec<String>>, SegmentError> {
        let input = serde_json::to_vec(batch)?;

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| SegmentError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        // Feed stdin from a separate thread so a child that writes before
        // reading all of its input cannot deadlock on a full pipe.
        let writer = child.stdin.take().map(|mut stdin| {
            thread::spawn(move || -> io::Result<()> {
                stdin.write_all(&input)?;
                stdin.flush()
            })
        });

        let output = child.wait_with_output()?;
        let write_result = match writer {
            Some(handle) => handle
                .join()
                .unwrap_or_else(|_| Err(io::Error::new(io::ErrorKind::Other, "stdin writer panicked"))),
            None => Ok(()),
        };

        if !output.status.success() {
            return Err(SegmentError::Exit {
                program: self.program.clone(),
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        write_result?;

        let tokens: Vec<Vec<String>> = serde_json::from_slice(&output.stdout)?;
        if tokens.len() != batch.len() {
            return Err(SegmentError::LengthMismatch {
                expected: batch.len(),
                got: tokens.len(),
            });
        }
        Ok(tokens)
    }
}

pub fn build_segmenter(spec: &SegmenterSpec) -> Box<dyn Segmenter> {
    match spec {
        SegmenterSpec::Char => Box::new(CharSegmenter),
        SegmenterSpec::Command { program, args } => {
            Box::new(CommandSegmenter::new(program.clone(), args.clone()))
        }
    }
}

/// Segment `texts` in fixed-size batches, in order.
///
/// Token lists are trimmed and empty tokens dropped.
pub fn segment_in_batches(
    segmenter: &dyn Segmenter,
    texts: &[String],
    batch_size: usize,
    label: &str,
    show_progress: bool,
) -> Result<Vec<Vec<String>>, BatchError> {
    let batch_size = batch_size.max(1);
    let progress = progress_bar(texts.len(), show_progress, label);
    let mut out = Vec::with_capacity(texts.len());

    for (batch_idx, batch) in texts.chunks(batch_size).enumerate() {
        let offset = batch_idx * batch_size;
        let tokens = segmenter.segment(batch).map_err(|source| BatchError {
            segmenter: segmenter.name().to_string(),
            offset,
            source,
        })?;
        debug!(label, offset, size = batch.len(), "segmented batch");

        out.extend(tokens.into_iter().map(|list| {
            list.into_iter()
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect::<Vec<_>>()
        }));
        if let Some(ref pb) = progress {
            pb.inc(batch.len() as u64);
        }
    }

    if let Some(pb) = progress {
        pb.finish_and_clear();
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_char_segmenter() {
        let out = CharSegmenter.segment(&strings(&["學古 入官", ""])).unwrap();
        assert_eq!(out, vec![strings(&["學", "古", "入", "官"]), vec![]]);
    }

    struct Failing;

    impl Segmenter for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        fn segment(&self, batch: &[String]) -> Result<Vec<Vec<String>>, SegmentError> {
            if batch.iter().any(|s| s == "bad") {
                Err(SegmentError::LengthMismatch {
                    expected: batch.len(),
                    got: 0,
                })
            } else {
                Ok(batch.iter().map(|s| vec![format!(" {} ", s), String::new()]).collect())
            }
        }
    }

    #[test]
    fn test_batches_preserve_order_and_clean_tokens() {
        let texts = strings(&["a", "b", "c", "d", "e"]);
        let out = segment_in_batches(&Failing, &texts, 2, "test", false).unwrap();
        assert_eq!(
            out,
            vec![
                strings(&["a"]),
                strings(&["b"]),
                strings(&["c"]),
                strings(&["d"]),
                strings(&["e"])
            ]
        );
    }

    #[test]
    fn test_batch_error_reports_offset() {
        let texts = strings(&["a", "b", "c", "bad", "e"]);
        let err = segment_in_batches(&Failing, &texts, 2, "test", false).unwrap_err();
        assert_eq!(err.offset, 2);
        assert_eq!(err.segmenter, "failing");
    }

    #[test]
    fn test_build_segmenter() {
        assert_eq!(build_segmenter(&SegmenterSpec::Char).name(), "char");
        let spec = SegmenterSpec::Command {
            program: "seg".into(),
            args: vec![],
        };
        assert_eq!(build_segmenter(&spec).name(), "seg");
    }

    #[test]
    fn test_missing_program_is_spawn_error() {
        let seg = CommandSegmenter::new("definitely-not-a-segmenter-binary", vec![]);
        let err = seg.segment(&strings(&["學古"])).unwrap_err();
        assert!(matches!(err, SegmentError::Spawn { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_command_segmenter_round_trip() {
        let seg = CommandSegmenter::new(
            "sh",
            strings(&["-c", r#"cat >/dev/null; printf '[["學古","入官"]]'"#]),
        );
        let out = seg.segment(&strings(&["學古入官"])).unwrap();
        assert_eq!(out, vec![strings(&["學古", "入官"])]);
    }

    #[cfg(unix)]
    #[test]
    fn test_command_segmenter_length_mismatch() {
        let seg = CommandSegmenter::new("sh", strings(&["-c", "cat >/dev/null; printf '[]'"]));
        let err = seg.segment(&strings(&["學古"])).unwrap_err();
        assert!(matches!(
            err,
            SegmentError::LengthMismatch {
                expected: 1,
                got: 0
            }
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_command_segmenter_nonzero_exit() {
        let seg = CommandSegmenter::new("sh", strings(&["-c", "echo boom >&2; exit 3"]));
        let err = seg.segment(&strings(&["學古"])).unwrap_err();
        match err {
            SegmentError::Exit { stderr, .. } => assert_eq!(stderr, "boom"),
            other => panic!("unexpected error: {other}"),
        }
    }
}
