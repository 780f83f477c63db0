//! Transform steps applied to source assets.
//!
//! Every step is a pure function from one [`Asset`] to the next. Chains of
//! steps are assembled by the [`TransformRegistry`](crate::TransformRegistry).

pub mod images;
pub mod purge;
pub mod rename;
pub mod script;
pub mod style;

use std::path::{Path, PathBuf};

pub use self::images::Optimize;
pub use self::rename::Rename;
pub use self::script::{MinifyScript, ParseScript, Transpile};
pub use self::style::{CompileSass, MinifyCss, Prefix, Purge};

/// A file moving through a transform chain.
#[derive(Debug, Clone, PartialEq)]
pub struct Asset {
    /// Output path relative to the class output directory
    pub path: PathBuf,

    /// Current contents
    pub contents: Vec<u8>,

    /// Source map (JSON) describing `contents`, when a step produced one
    pub source_map: Option<String>,
}

impl Asset {
    /// Create an asset from a path and its contents.
    pub fn new(path: impl Into<PathBuf>, contents: impl Into<Vec<u8>>) -> Self {
        Self {
            path: path.into(),
            contents: contents.into(),
            source_map: None,
        }
    }

    /// Contents as UTF-8 text.
    pub fn text(&self) -> Result<&str, TransformError> {
        std::str::from_utf8(&self.contents)
            .map_err(|_| TransformError::Encoding(self.path.display().to_string()))
    }

    /// Replace the contents with text. Any earlier source map no longer
    /// describes the contents and is dropped.
    pub fn with_text(self, text: String) -> Self {
        Self {
            path: self.path,
            contents: text.into_bytes(),
            source_map: None,
        }
    }

    /// Replace the contents with text described by `source_map`.
    pub fn with_mapped_text(self, text: String, source_map: String) -> Self {
        Self {
            source_map: Some(source_map),
            ..self.with_text(text)
        }
    }
}

/// Context handed to every step.
#[derive(Debug, Clone, Copy)]
pub struct TransformContext<'a> {
    /// Project root
    pub root: &'a Path,

    /// Absolute path of the source file being transformed
    pub source: &'a Path,
}

/// Errors produced by transform steps.
#[derive(Debug, thiserror::Error)]
pub enum TransformError {
    #[error("{message}")]
    Syntax {
        message: String,
        /// File the error is in, when it is not the source being transformed
        /// (an imported partial, for example)
        file: Option<PathBuf>,
        /// 1-based line of the error, when the tool reports one
        line: Option<usize>,
    },

    #[error("Invalid UTF-8 in {0}")]
    Encoding(String),

    #[error("{0}")]
    Failed(String),
}

impl TransformError {
    /// Syntax error with an optional source line.
    pub fn syntax(message: impl Into<String>, line: Option<usize>) -> Self {
        Self::Syntax {
            message: message.into(),
            file: None,
            line,
        }
    }

    /// Attribute a syntax error to another file. Other errors are unchanged.
    pub fn in_file(self, path: PathBuf) -> Self {
        match self {
            Self::Syntax { message, line, .. } => Self::Syntax {
                message,
                file: Some(path),
                line,
            },
            other => other,
        }
    }

    /// File the error points at, if it is not the transformed source.
    pub fn file(&self) -> Option<&Path> {
        match self {
            Self::Syntax { file, .. } => file.as_deref(),
            _ => None,
        }
    }

    /// Line the error points at, if known.
    pub fn line(&self) -> Option<usize> {
        match self {
            Self::Syntax { line, .. } => *line,
            _ => None,
        }
    }
}

/// A single named step in a transform chain.
pub trait TransformStep: Send + Sync {
    /// Step identifier used in logs and error messages (e.g. "compile")
    fn name(&self) -> &'static str;

    /// Transform one asset into the next.
    fn apply(&self, asset: Asset, ctx: &TransformContext<'_>) -> Result<Asset, TransformError>;
}
