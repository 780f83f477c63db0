//! Asset pipeline for kiln.
//!
//! Five fixed asset classes (styles, scripts, images, fonts, markup) each map
//! to an ordered chain of transform steps. The [`PipelineRunner`] expands a
//! class's source glob, pushes every file through its chain and writes the
//! results, isolating failures per file.

pub mod config;
pub mod discovery;
pub mod notify;
pub mod registry;
pub mod runner;
pub mod transform;

pub use config::{AssetClass, Config, FONT, IMAGE, MARKUP, SCRIPT, STYLE};
pub use discovery::{discover, glob_base, DiscoveryError, GlobMatcher, SourceSet};
pub use notify::{DesktopNotifier, LogNotifier, Notification, Notifier, RecordingNotifier};
pub use registry::{RegistryError, TransformRegistry};
pub use runner::{BuildResult, FileError, PipelineError, PipelineRunner};
pub use transform::{Asset, TransformContext, TransformError, TransformStep};
