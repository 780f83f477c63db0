//! Loading `kiln.toml`.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use kiln_pipeline::{Config, FONT, IMAGE, MARKUP, SCRIPT, STYLE};
use kiln_server::DevServerConfig;
use serde::Deserialize;

/// Configuration file structure (kiln.toml).
#[derive(Debug, Deserialize, Default)]
struct ConfigFile {
    #[serde(default)]
    paths: PathsSection,
    #[serde(default)]
    style: StyleSection,
    #[serde(default)]
    script: ScriptSection,
    #[serde(default)]
    image: ClassSection,
    #[serde(default)]
    font: ClassSection,
    #[serde(default)]
    markup: ClassSection,
    #[serde(default)]
    server: ServerSection,
}

#[derive(Debug, Deserialize, Default)]
struct PathsSection {
    build: Option<PathBuf>,
    publish: Option<PathBuf>,
    /// Markup scanned for used selectors
    purge: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct ClassSection {
    src: Option<String>,
    watch: Option<String>,
    dest: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
struct StyleSection {
    #[serde(flatten)]
    class: ClassSection,
    browsers: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Default)]
struct ScriptSection {
    #[serde(flatten)]
    class: ClassSection,
    /// Syntax level scripts are lowered to, e.g. "es2015"
    target: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ServerSection {
    #[serde(default = "default_port")]
    port: u16,
    #[serde(default = "default_host")]
    host: String,
    #[serde(default = "default_open")]
    open: bool,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            open: default_open(),
        }
    }
}

fn default_port() -> u16 {
    3000
}
fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_open() -> bool {
    true
}

/// Errors reading the configuration file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read { path: PathBuf, source: io::Error },

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Everything the tasks need, resolved against the project root.
#[derive(Debug, Clone)]
pub struct Settings {
    pub pipeline: Config,
    pub server: DevServerConfig,
}

/// Load settings for `root`. A missing config file means defaults.
pub fn load(root: &Path, path: &Path) -> Result<Settings, ConfigError> {
    let file = if path.exists() {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let file: ConfigFile = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::info!("Loaded config from {}", path.display());
        file
    } else {
        tracing::debug!("No {}, using defaults", path.display());
        ConfigFile::default()
    };

    Ok(file.into_settings(root))
}

impl ConfigFile {
    fn into_settings(self, root: &Path) -> Settings {
        let mut pipeline = Config::with_root(root);

        if let Some(build) = self.paths.build {
            // Default outputs follow the build root
            for class in &mut pipeline.classes {
                if let Ok(rest) = class.output_dir.strip_prefix(&pipeline.build_dir) {
                    class.output_dir = build.join(rest);
                }
            }
            pipeline.build_dir = build;
        }
        if let Some(publish) = self.paths.publish {
            pipeline.publish_dir = publish;
        }
        if let Some(purge) = self.paths.purge {
            pipeline.purge_content = purge;
        }
        if let Some(browsers) = self.style.browsers {
            pipeline.browsers = browsers;
        }
        if let Some(target) = self.script.target {
            pipeline.script_target = target;
        }

        for (name, section) in [
            (STYLE, self.style.class),
            (SCRIPT, self.script.class),
            (IMAGE, self.image),
            (FONT, self.font),
            (MARKUP, self.markup),
        ] {
            let Some(class) = pipeline.class_mut(name) else {
                continue;
            };
            if let Some(src) = section.src {
                class.source = src;
            }
            if let Some(watch) = section.watch {
                class.watch = watch;
            }
            if let Some(dest) = section.dest {
                class.output_dir = dest;
            }
        }

        let server = DevServerConfig {
            serve_dir: root.join(&pipeline.build_dir),
            port: self.server.port,
            host: self.server.host,
            open: self.server.open,
        };

        Settings { pipeline, server }
    }
}
