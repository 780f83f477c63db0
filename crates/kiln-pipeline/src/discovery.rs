//! Source file discovery from glob patterns.

use std::path::{Component, Path, PathBuf};

use glob::{MatchOptions, Pattern};

/// Files matched by a source glob.
#[derive(Debug, Clone, Default)]
pub struct SourceSet {
    /// Literal directory prefix of the glob; outputs keep paths relative to it
    pub base: PathBuf,

    /// Matched files, sorted
    pub files: Vec<PathBuf>,
}

/// Errors that can occur while expanding a glob.
#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("Invalid glob pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    #[error("Source directory not found: {0}")]
    MissingBase(PathBuf),
}

const GLOB_CHARS: &[char] = &['*', '?', '[', '{'];

/// Strip a leading `./` so patterns join cleanly onto the root.
fn normalize(pattern: &str) -> &str {
    pattern.trim_start_matches("./")
}

/// Literal directory prefix of a glob, relative to the root.
///
/// `src/js/**/*.js` has base `src/js`; a literal path such as
/// `src/scss/main.scss` has its parent directory as base.
pub fn glob_base(pattern: &str) -> PathBuf {
    let pattern = normalize(pattern);
    let parts: Vec<&str> = pattern.split('/').filter(|p| !p.is_empty()).collect();

    let literal = parts
        .iter()
        .take_while(|p| !p.contains(GLOB_CHARS))
        .count();

    let take = if literal == parts.len() {
        literal.saturating_sub(1)
    } else {
        literal
    };

    parts[..take].iter().collect()
}

/// Build the absolute pattern for a glob relative to `root`.
fn absolute_pattern(root: &Path, pattern: &str) -> String {
    let root = root.to_string_lossy();
    let root = Pattern::escape(root.trim_end_matches('/'));
    format!("{}/{}", root, normalize(pattern))
}

/// Expand `pattern` against `root` into a sorted set of files.
pub fn discover(root: &Path, pattern: &str) -> Result<SourceSet, DiscoveryError> {
    let base = root.join(glob_base(pattern));
    if !base.is_dir() {
        return Err(DiscoveryError::MissingBase(base));
    }

    let full = absolute_pattern(root, pattern);
    let entries = glob::glob_with(&full, match_options()).map_err(|e| {
        DiscoveryError::InvalidPattern {
            pattern: pattern.to_string(),
            message: e.to_string(),
        }
    })?;

    let mut files = Vec::new();
    for entry in entries {
        match entry {
            Ok(path) if path.is_file() => files.push(path),
            Ok(_) => {}
            Err(e) => tracing::warn!("Skipping unreadable path: {}", e),
        }
    }

    files.sort();
    Ok(SourceSet { base, files })
}

fn match_options() -> MatchOptions {
    MatchOptions {
        require_literal_separator: true,
        ..Default::default()
    }
}

/// A compiled glob that tests absolute paths.
#[derive(Debug, Clone)]
pub struct GlobMatcher {
    pattern: Pattern,
}

impl GlobMatcher {
    /// Compile `pattern` relative to `root`.
    pub fn new(root: &Path, pattern: &str) -> Result<Self, DiscoveryError> {
        let full = absolute_pattern(root, pattern);
        let pattern = Pattern::new(&full).map_err(|e| DiscoveryError::InvalidPattern {
            pattern: pattern.to_string(),
            message: e.to_string(),
        })?;
        Ok(Self { pattern })
    }

    /// Whether `path` matches the glob.
    pub fn matches(&self, path: &Path) -> bool {
        self.pattern.matches_path_with(path, match_options())
    }
}

/// Join `relative` onto `base`, refusing to escape it.
pub fn contained_join(base: &Path, relative: &Path) -> Option<PathBuf> {
    let escapes = relative
        .components()
        .any(|c| matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_)));
    (!escapes).then(|| base.join(relative))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn computes_glob_bases() {
        assert_eq!(glob_base("src/js/**/*.js"), PathBuf::from("src/js"));
        assert_eq!(glob_base("./src/**/*.html"), PathBuf::from("src"));
        assert_eq!(glob_base("src/scss/main.scss"), PathBuf::from("src/scss"));
        assert_eq!(glob_base("*.css"), PathBuf::new());
    }

    #[test]
    fn discovers_sorted_files() {
        let temp = tempdir().unwrap();
        let js = temp.path().join("src/js/nested");
        fs::create_dir_all(&js).unwrap();
        fs::write(temp.path().join("src/js/b.js"), "b").unwrap();
        fs::write(temp.path().join("src/js/a.js"), "a").unwrap();
        fs::write(js.join("c.js"), "c").unwrap();
        fs::write(js.join("ignored.txt"), "x").unwrap();

        let set = discover(temp.path(), "src/js/**/*.js").unwrap();
        let names: Vec<String> = set
            .files
            .iter()
            .map(|p| p.strip_prefix(&set.base).unwrap().display().to_string())
            .collect();

        assert_eq!(names, vec!["a.js", "b.js", "nested/c.js"]);
    }

    #[test]
    fn skips_directories() {
        let temp = tempdir().unwrap();
        fs::create_dir_all(temp.path().join("src/images/icons")).unwrap();
        fs::write(temp.path().join("src/images/logo.png"), "png").unwrap();

        let set = discover(temp.path(), "src/images/**/*").unwrap();

        assert_eq!(set.files.len(), 1);
    }

    #[test]
    fn reports_missing_base() {
        let temp = tempdir().unwrap();

        let err = discover(temp.path(), "src/fonts/**/*").unwrap_err();

        assert!(matches!(err, DiscoveryError::MissingBase(_)));
    }

    #[test]
    fn reports_invalid_pattern() {
        let temp = tempdir().unwrap();
        fs::create_dir_all(temp.path().join("src")).unwrap();

        let err = discover(temp.path(), "src/***.js").unwrap_err();

        assert!(matches!(err, DiscoveryError::InvalidPattern { .. }));
    }

    #[test]
    fn matcher_follows_recursive_globs() {
        let matcher = GlobMatcher::new(Path::new("/project"), "src/scss/**/*.scss").unwrap();

        assert!(matcher.matches(Path::new("/project/src/scss/main.scss")));
        assert!(matcher.matches(Path::new("/project/src/scss/base/_reset.scss")));
        assert!(!matcher.matches(Path::new("/project/src/js/app.js")));
    }

    #[test]
    fn refuses_escaping_joins() {
        let base = Path::new("/out");

        assert_eq!(
            contained_join(base, Path::new("css/main.css")),
            Some(PathBuf::from("/out/css/main.css"))
        );
        assert_eq!(contained_join(base, Path::new("../etc/passwd")), None);
    }
}
