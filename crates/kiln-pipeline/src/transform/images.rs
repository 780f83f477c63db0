//! Lossless image optimization.

use std::io::Cursor;

use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::ImageFormat;

use super::{Asset, TransformContext, TransformError, TransformStep};

/// Re-encode PNG images with maximum compression, keeping whichever of the
/// original and the re-encoded bytes is smaller.
///
/// JPEGs pass through untouched, since re-encoding them is lossy. So does
/// every other format.
#[derive(Debug, Default)]
pub struct Optimize;

impl TransformStep for Optimize {
    fn name(&self) -> &'static str {
        "optimize"
    }

    fn apply(&self, asset: Asset, _ctx: &TransformContext<'_>) -> Result<Asset, TransformError> {
        if ImageFormat::from_path(&asset.path).ok() != Some(ImageFormat::Png) {
            return Ok(asset);
        }

        let img = image::load(Cursor::new(&asset.contents), ImageFormat::Png)
            .map_err(|e| TransformError::Failed(format!("Failed to decode image: {}", e)))?;

        let mut encoded = Vec::new();
        let encoder =
            PngEncoder::new_with_quality(&mut encoded, CompressionType::Best, FilterType::Adaptive);
        img.write_with_encoder(encoder)
            .map_err(|e| TransformError::Failed(format!("Failed to encode image: {}", e)))?;

        if encoded.len() < asset.contents.len() {
            tracing::debug!(
                "Optimized {}: {} -> {} bytes",
                asset.path.display(),
                asset.contents.len(),
                encoded.len()
            );
            Ok(Asset::new(asset.path, encoded))
        } else {
            Ok(asset)
        }
    }
}
