//! Output renaming.

use super::{Asset, TransformContext, TransformError, TransformStep};

/// Rename an asset by appending a stem suffix and/or replacing its extension.
///
/// `Rename::suffix(".min")` turns `main.css` into `main.min.css`;
/// `Rename::extension("min.js")` turns `app.js` into `app.min.js`.
#[derive(Debug, Clone, Default)]
pub struct Rename {
    suffix: Option<&'static str>,
    extension: Option<&'static str>,
}

impl Rename {
    /// Append `suffix` to the file stem.
    pub fn suffix(suffix: &'static str) -> Self {
        Self {
            suffix: Some(suffix),
            extension: None,
        }
    }

    /// Replace the extension (without the leading dot).
    pub fn extension(extension: &'static str) -> Self {
        Self {
            suffix: None,
            extension: Some(extension),
        }
    }
}

impl TransformStep for Rename {
    fn name(&self) -> &'static str {
        "rename"
    }

    fn apply(&self, mut asset: Asset, _ctx: &TransformContext<'_>) -> Result<Asset, TransformError> {
        if let Some(suffix) = self.suffix {
            let stem = asset
                .path
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .ok_or_else(|| TransformError::Failed("cannot rename a path without a file name".to_string()))?;
            let name = match asset.path.extension() {
                Some(ext) => format!("{}{}.{}", stem, suffix, ext.to_string_lossy()),
                None => format!("{}{}", stem, suffix),
            };
            asset.path.set_file_name(name);
        }

        if let Some(extension) = self.extension {
            asset.path.set_extension(extension);
        }

        Ok(asset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::{Path, PathBuf};

    fn ctx() -> TransformContext<'static> {
        TransformContext {
            root: Path::new("/project"),
            source: Path::new("/project/src/file"),
        }
    }

    #[test]
    fn appends_suffix_before_extension() {
        let asset = Asset::new("nested/main.css", "");

        let renamed = Rename::suffix(".min").apply(asset, &ctx()).unwrap();

        assert_eq!(renamed.path, PathBuf::from("nested/main.min.css"));
    }

    #[test]
    fn replaces_extension() {
        let asset = Asset::new("app.js", "");

        let renamed = Rename::extension("min.js").apply(asset, &ctx()).unwrap();

        assert_eq!(renamed.path, PathBuf::from("app.min.js"));
    }
}
