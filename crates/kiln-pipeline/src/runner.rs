//! Pipeline runner: discover sources, apply a class chain, write outputs.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tokio::fs;
use walkdir::WalkDir;

use crate::config::{AssetClass, Config};
use crate::discovery::{contained_join, discover, DiscoveryError, SourceSet};
use crate::notify::{Notification, Notifier};
use crate::registry::{RegistryError, TransformRegistry};
use crate::transform::{Asset, TransformContext, TransformStep};

/// A per-file failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileError {
    /// Source path relative to the project root
    pub path: PathBuf,

    /// What went wrong, prefixed with the failing step
    pub message: String,
}

/// Result of one pipeline invocation.
#[derive(Debug, Clone, Default)]
pub struct BuildResult {
    /// Asset class that was built
    pub asset_class: String,

    /// Source files processed, relative to the project root
    pub files: Vec<PathBuf>,

    /// Output files written, relative to the project root
    pub outputs: Vec<PathBuf>,

    /// Per-file failures, in processing order
    pub errors: Vec<FileError>,

    /// Total run time in milliseconds
    pub duration_ms: u64,
}

impl BuildResult {
    fn new(asset_class: &str) -> Self {
        Self {
            asset_class: asset_class.to_string(),
            ..Default::default()
        }
    }

    /// Whether every file went through its chain.
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Errors that abort a whole invocation.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    #[error("Failed to clean {path}: {message}")]
    Clean { path: PathBuf, message: String },

    #[error("Failed to publish {path}: {message}")]
    Publish { path: PathBuf, message: String },
}

/// Runs transform chains for asset classes.
pub struct PipelineRunner {
    config: Arc<Config>,
    registry: TransformRegistry,
    notifier: Arc<dyn Notifier>,
}

impl PipelineRunner {
    /// Create a runner with the fixed chains for `config`.
    pub fn new(config: Config, notifier: Arc<dyn Notifier>) -> Result<Self, PipelineError> {
        let registry = TransformRegistry::from_config(&config)?;
        Ok(Self::with_registry(config, registry, notifier))
    }

    /// Create a runner with an explicit registry.
    pub fn with_registry(
        config: Config,
        registry: TransformRegistry,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            registry,
            notifier,
        }
    }

    /// Shared configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    fn class(&self, name: &str) -> Result<&AssetClass, PipelineError> {
        self.config
            .class(name)
            .ok_or_else(|| RegistryError::UnknownAssetClass(name.to_string()).into())
    }

    /// Build every source file of an asset class.
    pub async fn run(&self, class_name: &str) -> Result<BuildResult, PipelineError> {
        let start = Instant::now();
        let class = self.class(class_name)?;
        let chain = self.registry.get_chain(class_name)?;

        let sources = match discover(&self.config.root, &class.source) {
            Ok(set) => set,
            Err(DiscoveryError::MissingBase(dir)) if class.allow_empty => {
                tracing::debug!("No source directory for {}: {}", class.name, dir.display());
                SourceSet::default()
            }
            Err(e) => return Err(e.into()),
        };

        tracing::info!("Building {} ({} files)", class.name, sources.files.len());

        let output_dir = self.config.output_dir(class);
        let mut result = BuildResult::new(class_name);

        for source in &sources.files {
            let relative = PathBuf::from(self.config.relative(source));
            result.files.push(relative.clone());

            match self.build_file(source, &sources.base, &output_dir, chain).await {
                Ok(written) => {
                    result
                        .outputs
                        .extend(written.iter().map(|w| PathBuf::from(self.config.relative(w))));
                }
                Err(failure) => {
                    tracing::error!("{}: {}", relative.display(), failure.message);

                    if let Some(label) = &class.error_label {
                        // An error inside an import names the imported file
                        let failing = failure.file.as_deref().unwrap_or(source);
                        self.notifier.notify(&Notification::file_error(
                            label,
                            &self.config.relative(failing),
                            failure.line,
                        ));
                    }

                    result.errors.push(FileError {
                        path: relative,
                        message: failure.message,
                    });
                }
            }
        }

        result.duration_ms = start.elapsed().as_millis() as u64;

        tracing::info!(
            "Built {}: {} written, {} failed in {}ms",
            class.name,
            result.outputs.len(),
            result.errors.len(),
            result.duration_ms
        );

        Ok(result)
    }

    /// Read, transform and write one file. Returns the absolute paths written:
    /// the output, then its source map when the chain produced one.
    async fn build_file(
        &self,
        source: &Path,
        base: &Path,
        output_dir: &Path,
        chain: &[Box<dyn TransformStep>],
    ) -> Result<Vec<PathBuf>, FileFailure> {
        let contents = fs::read(source)
            .await
            .map_err(|e| FileFailure::io(format!("Failed to read: {}", e)))?;

        let relative = source.strip_prefix(base).unwrap_or(source);
        let asset = apply_chain(
            chain,
            Asset::new(relative, contents),
            &TransformContext {
                root: &self.config.root,
                source,
            },
        )?;

        let output = contained_join(output_dir, &asset.path).ok_or_else(|| {
            FileFailure::io(format!("Output escapes {}", output_dir.display()))
        })?;

        if let Some(parent) = output.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| FileFailure::io(format!("Failed to create {}: {}", parent.display(), e)))?;
        }

        let mut contents = asset.contents;
        let mut written = vec![output.clone()];

        if let Some(map) = &asset.source_map {
            let map_path = map_path(&output);
            let map_name = map_path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            contents.extend_from_slice(map_reference(&output, &map_name).as_bytes());

            fs::write(&map_path, map)
                .await
                .map_err(|e| FileFailure::io(format!("Failed to write {}: {}", map_path.display(), e)))?;
            written.push(map_path);
        }

        fs::write(&output, &contents)
            .await
            .map_err(|e| FileFailure::io(format!("Failed to write {}: {}", output.display(), e)))?;

        tracing::debug!("Wrote {}", output.display());
        Ok(written)
    }

    /// Force-remove the output directory of a class. A missing directory is not an error.
    pub async fn clean(&self, class_name: &str) -> Result<(), PipelineError> {
        let class = self.class(class_name)?;
        let dir = self.config.output_dir(class);

        match fs::remove_dir_all(&dir).await {
            Ok(()) => {
                tracing::info!("Cleaned {}", dir.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(PipelineError::Clean {
                path: dir,
                message: e.to_string(),
            }),
        }
    }

    /// Copy the build root into the publish root.
    pub async fn publish(&self) -> Result<BuildResult, PipelineError> {
        let start = Instant::now();
        let from = self.config.root.join(&self.config.build_dir);
        let to = self.config.root.join(&self.config.publish_dir);
        let publish_error = |path: &Path, e: &dyn std::fmt::Display| PipelineError::Publish {
            path: path.to_path_buf(),
            message: e.to_string(),
        };

        if !from.is_dir() {
            return Err(publish_error(&from, &"build output not found"));
        }

        let mut result = BuildResult::new("publish");

        for entry in WalkDir::new(&from).sort_by_file_name() {
            let entry = entry.map_err(|e| publish_error(&from, &e))?;
            if !entry.file_type().is_file() {
                continue;
            }

            let relative = entry.path().strip_prefix(&from).unwrap_or(entry.path());
            let target = to.join(relative);

            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)
                    .await
                    .map_err(|e| publish_error(parent, &e))?;
            }

            match fs::copy(entry.path(), &target).await {
                Ok(_) => {
                    result.files.push(PathBuf::from(self.config.relative(entry.path())));
                    result.outputs.push(PathBuf::from(self.config.relative(&target)));
                }
                Err(e) => result.errors.push(FileError {
                    path: PathBuf::from(self.config.relative(entry.path())),
                    message: format!("Failed to copy: {}", e),
                }),
            }
        }

        result.duration_ms = start.elapsed().as_millis() as u64;
        tracing::info!(
            "Published {} files to {}",
            result.outputs.len(),
            to.display()
        );

        Ok(result)
    }
}

/// `main.min.css` → `main.min.css.map`, next to the output.
fn map_path(output: &Path) -> PathBuf {
    let mut name = output.file_name().unwrap_or_default().to_os_string();
    name.push(".map");
    output.with_file_name(name)
}

/// Trailing comment pointing at the source map, in the output's comment syntax.
fn map_reference(output: &Path, map_name: &str) -> String {
    if output.extension().is_some_and(|ext| ext == "css") {
        format!("\n/*# sourceMappingURL={} */\n", map_name)
    } else {
        format!("\n//# sourceMappingURL={}\n", map_name)
    }
}

/// Why a single file failed.
#[derive(Debug)]
struct FileFailure {
    message: String,
    /// Failing file when it is not the source itself
    file: Option<PathBuf>,
    line: Option<usize>,
}

impl FileFailure {
    fn io(message: String) -> Self {
        Self {
            message,
            file: None,
            line: None,
        }
    }
}

/// Apply every step in order, stopping at the first failure.
fn apply_chain(
    chain: &[Box<dyn TransformStep>],
    asset: Asset,
    ctx: &TransformContext<'_>,
) -> Result<Asset, FileFailure> {
    chain.iter().try_fold(asset, |asset, step| {
        step.apply(asset, ctx).map_err(|e| FileFailure {
            message: format!("{}: {}", step.name(), e),
            file: e.file().map(Path::to_path_buf),
            line: e.line(),
        })
    })
}
