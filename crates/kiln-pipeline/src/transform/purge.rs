//! Removal of unused CSS rules against a markup corpus.
//!
//! A selector survives when every class, id and element name it requires
//! appears as a word in the corpus. Arguments of functional pseudo-classes
//! (`:not(...)`, `:is(...)`), attribute selectors and pseudo-elements are not
//! required. Grouping rules (`@media`, `@supports`, `@layer`, `@container`)
//! are purged recursively and dropped when empty; other at-rules
//! (`@font-face`, `@keyframes`, ...) are kept.

use std::collections::HashSet;
use std::sync::LazyLock;

use lightningcss::rules::{CssRule, CssRuleList};
use lightningcss::stylesheet::{ParserOptions, PrinterOptions, StyleSheet};
use lightningcss::traits::ToCss;
use regex::Regex;

use super::style::parse_error;
use super::TransformError;

static WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[A-Za-z0-9_-]+").unwrap());
static FUNCTIONAL_PSEUDO: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r":{1,2}[A-Za-z-]+\([^)]*\)").unwrap());
static PSEUDO: LazyLock<Regex> = LazyLock::new(|| Regex::new(r":{1,2}[A-Za-z-]+").unwrap());
static ATTRIBUTE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[[^\]]*\]").unwrap());
static CLASS_OR_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[.#](-?[A-Za-z_][A-Za-z0-9_-]*)").unwrap());
static ELEMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|[\s>+~])([A-Za-z][A-Za-z0-9-]*)").unwrap());

/// Words found in the markup corpus.
#[derive(Debug, Clone, Default)]
pub struct Corpus {
    words: HashSet<String>,
}

impl Corpus {
    /// Extract words from markup documents.
    pub fn from_documents<'a>(documents: impl IntoIterator<Item = &'a str>) -> Self {
        let words = documents
            .into_iter()
            .flat_map(|doc| WORD.find_iter(doc).map(|m| m.as_str().to_string()))
            .collect();
        Self { words }
    }

    /// Whether the corpus mentions `word`.
    pub fn contains(&self, word: &str) -> bool {
        self.words.contains(word)
    }

    /// Number of distinct words.
    pub fn len(&self) -> usize {
        self.words.len()
    }

    /// Whether the corpus is empty.
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

/// Whether every name the selector requires appears in the corpus.
pub fn selector_used(selector: &str, corpus: &Corpus) -> bool {
    let stripped = FUNCTIONAL_PSEUDO.replace_all(selector, " ");
    let stripped = ATTRIBUTE.replace_all(&stripped, " ");
    let stripped = PSEUDO.replace_all(&stripped, " ");

    let classes_and_ids = CLASS_OR_ID
        .captures_iter(&stripped)
        .all(|c| corpus.contains(&c[1]));

    let without_names = CLASS_OR_ID.replace_all(&stripped, " ");
    let elements = ELEMENT
        .captures_iter(&without_names)
        .all(|c| corpus.contains(&c[1].to_ascii_lowercase()) || corpus.contains(&c[1]));

    classes_and_ids && elements
}

/// Remove unused selectors, and rules left with none.
pub fn purge_css(css: &str, corpus: &Corpus) -> Result<String, TransformError> {
    let mut stylesheet = StyleSheet::parse(css, ParserOptions::default()).map_err(parse_error)?;

    purge_rules(&mut stylesheet.rules, corpus);

    stylesheet
        .to_css(PrinterOptions::default())
        .map(|res| res.code)
        .map_err(|e| TransformError::Failed(e.to_string()))
}

fn purge_rules(rules: &mut CssRuleList<'_>, corpus: &Corpus) {
    rules.0.retain_mut(|rule| match rule {
        CssRule::Style(style) => {
            style.selectors.0.retain(|selector| {
                selector
                    .to_css_string(PrinterOptions::default())
                    .map(|text| selector_used(&text, corpus))
                    .unwrap_or(true)
            });
            !style.selectors.0.is_empty()
        }
        CssRule::Media(media) => {
            purge_rules(&mut media.rules, corpus);
            !media.rules.0.is_empty()
        }
        CssRule::Supports(supports) => {
            purge_rules(&mut supports.rules, corpus);
            !supports.rules.0.is_empty()
        }
        CssRule::LayerBlock(layer) => {
            purge_rules(&mut layer.rules, corpus);
            !layer.rules.0.is_empty()
        }
        CssRule::Container(container) => {
            purge_rules(&mut container.rules, corpus);
            !container.rules.0.is_empty()
        }
        _ => true,
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corpus(html: &str) -> Corpus {
        Corpus::from_documents([html])
    }

    #[test]
    fn extracts_words_from_markup() {
        let corpus = corpus(r#"<a class="btn btn-primary" id="cta">Go</a>"#);

        assert!(corpus.contains("btn"));
        assert!(corpus.contains("btn-primary"));
        assert!(corpus.contains("cta"));
        assert!(corpus.contains("a"));
    }

    #[test]
    fn keeps_used_and_drops_unused_rules() {
        let css = ".btn {\n  color: red;\n}\n\n.unused {\n  color: blue;\n}\n";
        let out = purge_css(css, &corpus(r#"<button class="btn">"#)).unwrap();

        assert!(out.contains(".btn"));
        assert!(!out.contains(".unused"));
    }

    #[test]
    fn trims_selector_lists() {
        let css = ".btn, .ghost, #hero { margin: 0 }";
        let out = purge_css(css, &corpus(r#"<div id="hero" class="btn">"#)).unwrap();

        assert!(out.starts_with(".btn, #hero {"));
        assert!(!out.contains(".ghost"));
    }

    #[test]
    fn comments_inside_selector_lists_are_ignored() {
        let css = ".btn /* primary */, .gone { color: red }";
        let out = purge_css(css, &corpus(r#"<a class="btn">"#)).unwrap();

        assert!(out.contains(".btn"));
        assert!(!out.contains(".gone"));
    }

    #[test]
    fn ignores_pseudo_and_attribute_parts() {
        let corpus = corpus(r#"<a class="btn" href="/">x</a>"#);

        assert!(selector_used(".btn:hover", &corpus));
        assert!(selector_used(".btn::before", &corpus));
        assert!(selector_used("a[href^='/']", &corpus));
        assert!(selector_used(".btn:not(.disabled)", &corpus));
        assert!(selector_used("*", &corpus));
        assert!(!selector_used("ul > li", &corpus));
    }

    #[test]
    fn purges_inside_media_queries() {
        let css = "@media screen {\n  .btn { padding: 0 }\n  .gone { padding: 1px }\n}\n\
                   @media print {\n  .gone { display: none }\n}\n";
        let out = purge_css(css, &corpus(r#"<i class="btn">"#)).unwrap();

        assert!(out.contains("@media screen"));
        assert!(out.contains(".btn"));
        assert!(!out.contains(".gone"));
        assert!(!out.contains("@media print"));
    }

    #[test]
    fn keeps_other_at_rules() {
        let css = "@font-face { font-family: X; src: url(x.woff) }\n\
                   @keyframes spin { from { opacity: 0 } to { opacity: 1 } }\n";
        let out = purge_css(css, &Corpus::default()).unwrap();

        assert!(out.contains("@font-face"));
        assert!(out.contains("@keyframes spin"));
    }

    #[test]
    fn braces_inside_strings_do_not_split_rules() {
        let css = ".btn::after { content: \"}\" }\n.gone { color: red }";
        let out = purge_css(css, &corpus(r#"<b class="btn">"#)).unwrap();

        assert!(out.contains(".btn:after") || out.contains(".btn::after"));
        assert!(!out.contains(".gone"));
    }
}
