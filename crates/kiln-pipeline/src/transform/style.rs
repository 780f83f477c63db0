//! Stylesheet steps: Sass compilation, prefixing, purging and minification.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use lightningcss::stylesheet::{MinifyOptions, ParserOptions, PrinterOptions, StyleSheet};
use lightningcss::targets::{Browsers, Targets};
use parcel_sourcemap::SourceMap;
use regex::Regex;

use super::purge::{purge_css, Corpus};
use super::{Asset, TransformContext, TransformError, TransformStep};
use crate::discovery::discover;

static SASS_GUTTER_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*(\d+)\s+[│|] ").unwrap());
/// Trailing location line of a grass error: `./stdin:4:5` or `path/_vars.scss 5:9  @import`.
static SASS_LOCATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\S.*?)[: ](\d+):\d+(?:\s.*)?$").unwrap());

/// Compile SCSS to expanded CSS with `grass`.
///
/// Imports resolve relative to the source file's directory.
#[derive(Debug, Default)]
pub struct CompileSass;

impl TransformStep for CompileSass {
    fn name(&self) -> &'static str {
        "compile"
    }

    fn apply(&self, asset: Asset, ctx: &TransformContext<'_>) -> Result<Asset, TransformError> {
        let source = asset.text()?.to_string();
        let load_dir = load_dir(ctx);

        let options = grass::Options::default()
            .load_path(load_dir.as_path())
            .style(grass::OutputStyle::Expanded);

        let css = grass::from_string(source, &options)
            .map_err(|e| sass_error(&e.to_string(), ctx))?;

        let mut asset = asset.with_text(css);
        asset.path.set_extension("css");
        Ok(asset)
    }
}

fn load_dir(ctx: &TransformContext<'_>) -> PathBuf {
    ctx.source
        .parent()
        .map(|p| p.to_path_buf())
        .unwrap_or_else(|| ctx.root.to_path_buf())
}

/// Turn a rendered grass error into a syntax error with its file and line.
fn sass_error(rendered: &str, ctx: &TransformContext<'_>) -> TransformError {
    let message = rendered
        .lines()
        .next()
        .unwrap_or("Sass compilation failed")
        .trim_start_matches("Error: ")
        .to_string();

    match sass_location(rendered) {
        Some((name, line)) => {
            let error = TransformError::syntax(message, Some(line));
            match failing_file(&name, ctx) {
                Some(path) => error.in_file(path),
                None => error,
            }
        }
        None => {
            let line = SASS_GUTTER_LINE
                .captures(rendered)
                .and_then(|c| c[1].parse().ok());
            TransformError::syntax(message, line)
        }
    }
}

/// First location line after the snippet; later lines are the import stack.
fn sass_location(rendered: &str) -> Option<(String, usize)> {
    rendered
        .lines()
        .map(str::trim)
        .filter(|l| !l.contains(['│', '|']))
        .find_map(|l| {
            let c = SASS_LOCATION.captures(l)?;
            Some((c[1].to_string(), c[2].parse().ok()?))
        })
}

/// Resolve a file named by grass. `None` means the entry source itself.
fn failing_file(name: &str, ctx: &TransformContext<'_>) -> Option<PathBuf> {
    let name = name.trim_start_matches("./");
    if name.is_empty() || name == "stdin" || name == "-" {
        return None;
    }

    let path = Path::new(name);
    let path = if path.is_absolute() {
        path.to_path_buf()
    } else {
        [load_dir(ctx).join(path), ctx.root.join(path)]
            .into_iter()
            .find(|p| p.is_file())
            .unwrap_or_else(|| path.to_path_buf())
    };

    (path != ctx.source).then_some(path)
}

pub(super) fn parse_error<T: std::fmt::Display>(
    error: lightningcss::error::Error<T>,
) -> TransformError {
    let line = error.loc.as_ref().map(|l| l.line as usize + 1);
    TransformError::syntax(error.kind.to_string(), line)
}

/// Add vendor prefixes for the configured browser targets.
pub struct Prefix {
    browsers: Option<Browsers>,
}

impl Prefix {
    /// Resolve browserslist queries into prefixing targets.
    pub fn new<S: AsRef<str>>(queries: &[S]) -> Result<Self, String> {
        let browsers = Browsers::from_browserslist(queries.iter().map(|q| q.as_ref()))
            .map_err(|e| e.to_string())?;
        Ok(Self { browsers })
    }

    fn targets(&self) -> Targets {
        Targets {
            browsers: self.browsers,
            ..Targets::default()
        }
    }
}

impl TransformStep for Prefix {
    fn name(&self) -> &'static str {
        "prefix"
    }

    fn apply(&self, asset: Asset, _ctx: &TransformContext<'_>) -> Result<Asset, TransformError> {
        let code = {
            let css = asset.text()?;
            let mut stylesheet = StyleSheet::parse(css, ParserOptions::default()).map_err(parse_error)?;

            stylesheet
                .minify(MinifyOptions {
                    targets: self.targets(),
                    ..Default::default()
                })
                .map_err(|e| TransformError::Failed(e.to_string()))?;

            stylesheet
                .to_css(PrinterOptions {
                    minify: false,
                    targets: self.targets(),
                    ..Default::default()
                })
                .map_err(|e| TransformError::Failed(e.to_string()))?
                .code
        };

        Ok(asset.with_text(code))
    }
}

/// Drop rules whose selectors never appear in the markup corpus.
#[derive(Debug, Clone)]
pub struct Purge {
    content: String,
}

impl Purge {
    /// Purge against the markup matched by `content` (relative to the project root).
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
        }
    }

    fn corpus(&self, ctx: &TransformContext<'_>) -> Result<Corpus, TransformError> {
        let files: Vec<PathBuf> = match discover(ctx.root, &self.content) {
            Ok(set) => set.files,
            Err(crate::discovery::DiscoveryError::MissingBase(_)) => Vec::new(),
            Err(e) => return Err(TransformError::Failed(e.to_string())),
        };

        let documents = files
            .iter()
            .map(|path| {
                fs::read_to_string(path).map_err(|e| {
                    TransformError::Failed(format!("Failed to read {}: {}", path.display(), e))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Corpus::from_documents(documents.iter().map(String::as_str)))
    }
}

impl TransformStep for Purge {
    fn name(&self) -> &'static str {
        "purge"
    }

    fn apply(&self, asset: Asset, ctx: &TransformContext<'_>) -> Result<Asset, TransformError> {
        let corpus = self.corpus(ctx)?;
        tracing::debug!("Purging {} against {} words", asset.path.display(), corpus.len());

        let purged = purge_css(asset.text()?, &corpus)?;
        Ok(asset.with_text(purged))
    }
}

/// Minify CSS using lightningcss, with a source map of the minified output.
#[derive(Debug, Default)]
pub struct MinifyCss;

impl TransformStep for MinifyCss {
    fn name(&self) -> &'static str {
        "minify"
    }

    fn apply(&self, asset: Asset, _ctx: &TransformContext<'_>) -> Result<Asset, TransformError> {
        let (code, map) = {
            let css = asset.text()?;
            let filename = asset.path.to_string_lossy().into_owned();
            let mut stylesheet = StyleSheet::parse(
                css,
                ParserOptions {
                    filename: filename.clone(),
                    ..ParserOptions::default()
                },
            )
            .map_err(parse_error)?;

            stylesheet
                .minify(MinifyOptions::default())
                .map_err(|e| TransformError::Failed(e.to_string()))?;

            let mut source_map = SourceMap::new("/");
            source_map.add_source(&filename);
            source_map
                .set_source_content(0, css)
                .map_err(|e| TransformError::Failed(e.to_string()))?;

            let code = stylesheet
                .to_css(PrinterOptions {
                    minify: true,
                    source_map: Some(&mut source_map),
                    ..Default::default()
                })
                .map_err(|e| TransformError::Failed(e.to_string()))?
                .code;

            let map = source_map
                .to_json(None)
                .map_err(|e| TransformError::Failed(e.to_string()))?;
            (code, map)
        };

        Ok(asset.with_mapped_text(code, map))
    }
}
