use async_trait::async_trait;
use tracing::debug;

use super::{DecodeError, DecodeStrategy, PreparedImage};

/// Scans the luma plane for 1D and 2D symbols on the blocking pool.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalScanStrategy;

#[async_trait]
impl DecodeStrategy for LocalScanStrategy {
    fn name(&self) -> &'static str {
        "local-scan"
    }

    async fn decode(&self, image: &PreparedImage) -> Result<String, DecodeError> {
        let (width, height) = image.dimensions();
        let luma = image.luma.as_raw().clone();

        let scanned = tokio::task::spawn_blocking(move || {
            rxing::helpers::detect_multiple_in_luma(luma, width, height)
        })
        .await
        .map_err(|e| DecodeError::Task(e.to_string()))?;

        let symbols = match scanned {
            Ok(symbols) => symbols,
            Err(e) => {
                debug!(error = ?e, "Local scan found no symbol");
                return Err(DecodeError::NotDetected);
            }
        };

        for symbol in &symbols {
            debug!(format = ?symbol.getBarcodeFormat(), "Symbol detected");
        }

        symbols
            .first()
            .map(|symbol| symbol.getText().to_string())
            .ok_or(DecodeError::NotDetected)
    }
}
