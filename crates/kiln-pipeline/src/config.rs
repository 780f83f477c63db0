//! Build configuration: project layout and the fixed set of asset classes.

use std::path::{Path, PathBuf};

/// Name of the stylesheet asset class.
pub const STYLE: &str = "style";
/// Name of the JavaScript asset class.
pub const SCRIPT: &str = "script";
/// Name of the image asset class.
pub const IMAGE: &str = "image";
/// Name of the font asset class.
pub const FONT: &str = "font";
/// Name of the HTML asset class.
pub const MARKUP: &str = "markup";

/// One class of source assets and where its build output goes.
#[derive(Debug, Clone, PartialEq)]
pub struct AssetClass {
    /// Class name, used to look up the transform chain
    pub name: String,

    /// Glob selecting the source files, relative to the project root
    pub source: String,

    /// Glob watched for changes, relative to the project root
    pub watch: String,

    /// Output directory, relative to the project root
    pub output_dir: PathBuf,

    /// Treat a missing source directory as an empty match
    pub allow_empty: bool,

    /// Label for desktop error notifications ("Error: <label>").
    /// Classes without a label only report errors in the build result.
    pub error_label: Option<String>,
}

impl AssetClass {
    fn new(name: &str, source: &str, watch: &str, output_dir: &str) -> Self {
        Self {
            name: name.to_string(),
            source: source.to_string(),
            watch: watch.to_string(),
            output_dir: PathBuf::from(output_dir),
            allow_empty: false,
            error_label: None,
        }
    }
}

/// Configuration shared by every pipeline component.
#[derive(Debug, Clone)]
pub struct Config {
    /// Project root all relative paths resolve against
    pub root: PathBuf,

    /// Build output root
    pub build_dir: PathBuf,

    /// Publish root, a copy of the build output for static hosting
    pub publish_dir: PathBuf,

    /// Markup glob scanned by the purge step
    pub purge_content: String,

    /// Browserslist queries for vendor prefixing
    pub browsers: Vec<String>,

    /// ECMAScript version scripts are lowered to (`es2015`, `es2020`, ...)
    pub script_target: String,

    /// The asset classes, in declaration order
    pub classes: Vec<AssetClass>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            build_dir: PathBuf::from("dist"),
            publish_dir: PathBuf::from("docs"),
            purge_content: "src/**/*.html".to_string(),
            browsers: vec![
                "last 2 versions".to_string(),
                "> 5%".to_string(),
                "Firefox ESR".to_string(),
            ],
            script_target: "es2015".to_string(),
            classes: default_classes(),
        }
    }
}

fn default_classes() -> Vec<AssetClass> {
    let mut style = AssetClass::new(STYLE, "src/scss/main.scss", "src/scss/**/*.scss", "dist/css");
    style.error_label = Some("Styles".to_string());

    let mut image = AssetClass::new(IMAGE, "src/images/**/*", "src/images/**/*.*", "dist/images");
    image.allow_empty = true;

    let mut font = AssetClass::new(FONT, "src/fonts/**/*", "src/fonts/**/*.*", "dist/fonts");
    font.allow_empty = true;

    vec![
        style,
        AssetClass::new(SCRIPT, "src/js/**/*.js", "src/js/**/*.js", "dist/js"),
        image,
        font,
        AssetClass::new(MARKUP, "src/**/*.html", "src/**/*.html", "dist"),
    ]
}

impl Config {
    /// Default layout rooted at `root`.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Default::default()
        }
    }

    /// Look up an asset class by name.
    pub fn class(&self, name: &str) -> Option<&AssetClass> {
        self.classes.iter().find(|c| c.name == name)
    }

    /// Mutable lookup, used when applying overrides.
    pub fn class_mut(&mut self, name: &str) -> Option<&mut AssetClass> {
        self.classes.iter_mut().find(|c| c.name == name)
    }

    /// Absolute output directory of a class.
    pub fn output_dir(&self, class: &AssetClass) -> PathBuf {
        self.root.join(&class.output_dir)
    }

    /// Path relative to the project root, with forward slashes.
    pub fn relative(&self, path: &Path) -> String {
        let relative = path.strip_prefix(&self.root).unwrap_or(path);
        relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defines_five_classes() {
        let config = Config::default();
        let names: Vec<&str> = config.classes.iter().map(|c| c.name.as_str()).collect();

        assert_eq!(names, vec![STYLE, SCRIPT, IMAGE, FONT, MARKUP]);
    }

    #[test]
    fn only_styles_notify() {
        let config = Config::default();

        assert_eq!(
            config.class(STYLE).unwrap().error_label.as_deref(),
            Some("Styles")
        );
        assert!(config.class(SCRIPT).unwrap().error_label.is_none());
    }

    #[test]
    fn relative_paths_use_forward_slashes() {
        let config = Config::with_root("/project");
        let path = Path::new("/project/src/scss/main.scss");

        assert_eq!(config.relative(path), "src/scss/main.scss");
    }
}
