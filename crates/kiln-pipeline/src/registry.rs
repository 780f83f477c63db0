//! Transform registry: the ordered step chain of every asset class.

use std::collections::HashMap;

use crate::config::{Config, FONT, IMAGE, MARKUP, SCRIPT, STYLE};
use crate::transform::{
    CompileSass, MinifyCss, MinifyScript, Optimize, ParseScript, Prefix, Purge, Rename,
    TransformStep, Transpile,
};

/// An ordered chain of transform steps.
pub type Chain = Vec<Box<dyn TransformStep>>;

/// A registry of transform chains keyed by asset class name.
#[derive(Default)]
pub struct TransformRegistry {
    chains: HashMap<String, Chain>,
}

impl TransformRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the fixed chains for the configured classes.
    pub fn from_config(config: &Config) -> Result<Self, RegistryError> {
        let mut registry = Self::new();

        let prefix = Prefix::new(&config.browsers).map_err(RegistryError::InvalidBrowsers)?;
        let transpile =
            Transpile::new(config.script_target.clone()).map_err(RegistryError::InvalidScriptTarget)?;

        registry.register(
            STYLE,
            vec![
                Box::new(CompileSass),
                Box::new(prefix),
                Box::new(Purge::new(config.purge_content.clone())),
                Box::new(MinifyCss),
                Box::new(Rename::suffix(".min")),
            ],
        );
        registry.register(
            SCRIPT,
            vec![
                Box::new(ParseScript),
                Box::new(transpile),
                Box::new(Rename::extension("min.js")),
                Box::new(MinifyScript),
            ],
        );
        registry.register(IMAGE, vec![Box::new(Optimize)]);
        registry.register(FONT, Vec::new());
        registry.register(MARKUP, Vec::new());

        // Chains exist only for classes the configuration defines.
        registry
            .chains
            .retain(|name, _| config.class(name).is_some());

        Ok(registry)
    }

    /// Register (or replace) the chain of a class.
    pub fn register(&mut self, class: &str, chain: Chain) {
        self.chains.insert(class.to_string(), chain);
    }

    /// Ordered steps for a class.
    pub fn get_chain(&self, class: &str) -> Result<&[Box<dyn TransformStep>], RegistryError> {
        self.chains
            .get(class)
            .map(|chain| chain.as_slice())
            .ok_or_else(|| RegistryError::UnknownAssetClass(class.to_string()))
    }

    /// Step names of a class chain, for logging.
    pub fn step_names(&self, class: &str) -> Result<Vec<&'static str>, RegistryError> {
        Ok(self.get_chain(class)?.iter().map(|s| s.name()).collect())
    }

    /// All registered class names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.chains.keys().map(String::as_str).collect();
        names.sort();
        names
    }
}

/// Errors that can occur with the registry.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Unknown asset class: {0}")]
    UnknownAssetClass(String),

    #[error("Invalid browser targets: {0}")]
    InvalidBrowsers(String),

    #[error("Invalid script target: {0}")]
    InvalidScriptTarget(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_fixed_chains() {
        let registry = TransformRegistry::from_config(&Config::default()).unwrap();

        assert_eq!(
            registry.step_names(STYLE).unwrap(),
            vec!["compile", "prefix", "purge", "minify", "rename"]
        );
        assert_eq!(
            registry.step_names(SCRIPT).unwrap(),
            vec!["parse", "transpile", "rename", "minify"]
        );
        assert_eq!(registry.step_names(IMAGE).unwrap(), vec!["optimize"]);
        assert!(registry.get_chain(FONT).unwrap().is_empty());
        assert!(registry.get_chain(MARKUP).unwrap().is_empty());
    }

    #[test]
    fn rejects_unknown_classes() {
        let registry = TransformRegistry::from_config(&Config::default()).unwrap();

        let err = registry.get_chain("video").err().unwrap();

        assert!(matches!(err, RegistryError::UnknownAssetClass(name) if name == "video"));
    }

    #[test]
    fn omits_unconfigured_classes() {
        let mut config = Config::default();
        config.classes.retain(|c| c.name != FONT);

        let registry = TransformRegistry::from_config(&config).unwrap();

        assert_eq!(registry.names(), vec![IMAGE, MARKUP, SCRIPT, STYLE]);
    }

    #[test]
    fn rejects_bad_browser_queries() {
        let mut config = Config::default();
        config.browsers = vec!["not a real query ~~".to_string()];

        assert!(matches!(
            TransformRegistry::from_config(&config),
            Err(RegistryError::InvalidBrowsers(_))
        ));
    }

    #[test]
    fn rejects_unknown_script_targets() {
        let mut config = Config::default();
        config.script_target = "es1999".to_string();

        assert!(matches!(
            TransformRegistry::from_config(&config),
            Err(RegistryError::InvalidScriptTarget(_))
        ));
    }
}
