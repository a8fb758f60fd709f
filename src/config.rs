//! TOML configuration for matching parameters.
//!
//! Any subset of `MatchParams` fields may appear in the file; missing
//! fields keep their defaults.
//!
//! ```toml
//! author = "王起"
//! jaccard_threshold = 0.75
//! ngram_sizes = [2, 3]
//!
//! [segmenter]
//! kind = "command"
//! program = "ckip-segment"
//! args = ["--json"]
//! ```

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

use crate::models::{MatchParams, SegmenterSpec};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid config {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid parameter: {0}")]
    Invalid(String),
}

pub fn parse_params(text: &str) -> Result<MatchParams, toml::de::Error> {
    toml::from_str(text)
}

/// Load parameters from `path`, or the defaults when no file is given.
pub fn load_params(path: Option<&Path>) -> Result<MatchParams, ConfigError> {
    let Some(path) = path else {
        return Ok(MatchParams::default());
    };
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let params = parse_params(&text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    info!(path = %path.display(), "loaded configuration");
    Ok(params)
}

impl MatchParams {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ngram_sizes.is_empty() {
            return Err(ConfigError::Invalid("ngram_sizes must not be empty".into()));
        }
        if self.ngram_sizes.contains(&0) {
            return Err(ConfigError::Invalid("ngram_sizes must be positive".into()));
        }
        if !(0.0..=1.0).contains(&self.jaccard_threshold) {
            return Err(ConfigError::Invalid(format!(
                "jaccard_threshold must be within [0, 1], got {}",
                self.jaccard_threshold
            )));
        }
        if self.segment_batch_size == 0 {
            return Err(ConfigError::Invalid("segment_batch_size must be positive".into()));
        }
        if self.score_batch_size == 0 {
            return Err(ConfigError::Invalid("score_batch_size must be positive".into()));
        }
        if self.delimiters.is_empty() {
            return Err(ConfigError::Invalid("delimiters must not be empty".into()));
        }
        if let SegmenterSpec::Command { program, .. } = &self.segmenter {
            if program.trim().is_empty() {
                return Err(ConfigError::Invalid("segmenter program must not be empty".into()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        assert!(MatchParams::default().validate().is_ok());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let params = parse_params("author = \"王起\"\njaccard_threshold = 0.8\n").unwrap();
        assert_eq!(params.author, "王起");
        assert_eq!(params.jaccard_threshold, 0.8);
        assert_eq!(params.ngram_sizes, vec![2, 3, 4]);
        assert_eq!(params.segment_batch_size, 500);
        assert!(params.verify_ngram_text);
    }

    #[test]
    fn test_segmenter_table() {
        let params = parse_params(
            "[segmenter]\nkind = \"command\"\nprogram = \"seg\"\nargs = [\"--json\"]\n",
        )
        .unwrap();
        assert_eq!(
            params.segmenter,
            SegmenterSpec::Command {
                program: "seg".into(),
                args: vec!["--json".into()]
            }
        );
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let bad = [
            MatchParams {
                ngram_sizes: vec![],
                ..Default::default()
            },
            MatchParams {
                ngram_sizes: vec![2, 0],
                ..Default::default()
            },
            MatchParams {
                jaccard_threshold: 1.5,
                ..Default::default()
            },
            MatchParams {
                jaccard_threshold: f64::NAN,
                ..Default::default()
            },
            MatchParams {
                score_batch_size: 0,
                ..Default::default()
            },
            MatchParams {
                segmenter: SegmenterSpec::Command {
                    program: " ".into(),
                    args: vec![],
                },
                ..Default::default()
            },
        ];
        for params in bad {
            assert!(matches!(params.validate(), Err(ConfigError::Invalid(_))));
        }
    }

    #[test]
    fn test_load_params() {
        assert_eq!(load_params(None).unwrap(), MatchParams::default());

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lufu.toml");
        std::fs::write(&path, "ngram_sizes = [3]\n").unwrap();
        assert_eq!(load_params(Some(&path)).unwrap().ngram_sizes, vec![3]);

        std::fs::write(&path, "ngram_sizes = \"three\"\n").unwrap();
        assert!(matches!(
            load_params(Some(&path)),
            Err(ConfigError::Parse { .. })
        ));
        assert!(matches!(
            load_params(Some(&dir.path().join("missing.toml"))),
            Err(ConfigError::Read { .. })
        ));
    }
}
