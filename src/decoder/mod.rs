//! Barcode extraction from uploaded images.
//!
//! An upload is checked against the image allow-list, normalized once, then
//! handed to an ordered chain of [`DecodeStrategy`] implementations. The first
//! strategy that yields a value wins. When every strategy fails the normalized
//! image is analysed so the caller gets a diagnostic report alongside
//! [`TicketError::NoBarcodeDetected`].

use std::time::Duration;

use async_trait::async_trait;
use axum::body::Bytes;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::services::error::TicketError;

pub mod diagnostics;
pub mod local;
pub mod preprocess;
pub mod remote;

pub use diagnostics::{ImageAnalysis, Sharpness};
pub use local::LocalScanStrategy;
pub use preprocess::{is_supported_mime, PreparedImage};
pub use remote::RemoteDecodeStrategy;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("no barcode detected")]
    NotDetected,

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("remote decoder responded with status {0}")]
    Status(u16),

    #[error("request failed: {0}")]
    Request(String),

    #[error("decoder task failed: {0}")]
    Task(String),
}

/// One way of turning a normalized image into a barcode string.
#[async_trait]
pub trait DecodeStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    async fn decode(&self, image: &PreparedImage) -> Result<String, DecodeError>;
}

#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub file_name: Option<String>,
    pub content_type: String,
    pub bytes: Bytes,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileDetails {
    pub name: Option<String>,
    pub size: usize,
    #[serde(rename = "type")]
    pub content_type: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DecodeAttempt {
    pub method: &'static str,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Diagnostic payload returned with every image verification response.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DecodeReport {
    pub received_file: bool,
    pub file_details: Option<FileDetails>,
    pub decode_attempts: Vec<DecodeAttempt>,
    pub image_analysis: Option<ImageAnalysis>,
    pub decoded_barcode: Option<String>,
    pub ticket_status: Option<String>,
    pub error: Option<String>,
}

impl DecodeReport {
    fn for_upload(upload: &ImageUpload) -> Self {
        Self {
            received_file: !upload.bytes.is_empty(),
            file_details: Some(FileDetails {
                name: upload.file_name.clone(),
                size: upload.bytes.len(),
                content_type: upload.content_type.clone(),
            }),
            ..Self::default()
        }
    }

    /// Report for a request that carried no image at all.
    pub fn missing_file() -> Self {
        Self {
            error: Some("No image buffer received".to_string()),
            ..Self::default()
        }
    }
}

#[derive(Debug)]
pub struct DecodeOutcome {
    pub result: Result<String, TicketError>,
    pub report: DecodeReport,
}

impl DecodeOutcome {
    fn failed(mut report: DecodeReport, error: TicketError) -> Self {
        report.error = Some(error.to_string());
        Self {
            result: Err(error),
            report,
        }
    }
}

pub struct BarcodeImageDecoder {
    strategies: Vec<Box<dyn DecodeStrategy>>,
}

impl BarcodeImageDecoder {
    /// Strategies run in the given order.
    pub fn new(strategies: Vec<Box<dyn DecodeStrategy>>) -> Self {
        Self { strategies }
    }

    /// Local scan first, then the remote service when an endpoint is set.
    pub fn with_defaults(
        remote_endpoint: Option<&str>,
        remote_timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let mut strategies: Vec<Box<dyn DecodeStrategy>> = vec![Box::new(LocalScanStrategy)];
        if let Some(endpoint) = remote_endpoint {
            strategies.push(Box::new(RemoteDecodeStrategy::new(endpoint, remote_timeout)?));
        }
        Ok(Self::new(strategies))
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    pub async fn decode(&self, upload: &ImageUpload) -> DecodeOutcome {
        let mut report = DecodeReport::for_upload(upload);

        if !is_supported_mime(&upload.content_type) {
            debug!(content_type = %upload.content_type, "Rejected upload media type");
            return DecodeOutcome::failed(
                report,
                TicketError::UnsupportedMediaType(upload.content_type.clone()),
            );
        }
        if upload.bytes.is_empty() {
            return DecodeOutcome::failed(
                report,
                TicketError::InvalidInput("Valid barcode image is required".to_string()),
            );
        }

        let bytes = upload.bytes.clone();
        let prepared = match tokio::task::spawn_blocking(move || preprocess::prepare(&bytes)).await
        {
            Ok(Ok(prepared)) => prepared,
            Ok(Err(e)) => {
                warn!(error = %e, "Image normalization failed");
                return DecodeOutcome::failed(
                    report,
                    TicketError::ImageProcessingFailed(e.to_string()),
                );
            }
            Err(e) => {
                warn!(error = %e, "Image normalization task failed");
                return DecodeOutcome::failed(
                    report,
                    TicketError::ImageProcessingFailed(e.to_string()),
                );
            }
        };
        report.image_analysis = Some(ImageAnalysis::sizes(
            upload.bytes.len(),
            prepared.png.len(),
        ));

        for strategy in &self.strategies {
            match strategy.decode(&prepared).await {
                Ok(barcode) => {
                    info!(method = strategy.name(), "Barcode decoded from image");
                    report.decode_attempts.push(DecodeAttempt {
                        method: strategy.name(),
                        success: true,
                        result: Some(barcode.clone()),
                        error: None,
                    });
                    report.decoded_barcode = Some(barcode.clone());
                    return DecodeOutcome {
                        result: Ok(barcode),
                        report,
                    };
                }
                Err(e) => {
                    debug!(method = strategy.name(), error = %e, "Decode attempt failed");
                    report.decode_attempts.push(DecodeAttempt {
                        method: strategy.name(),
                        success: false,
                        result: None,
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        let analysis = report
            .image_analysis
            .get_or_insert_with(|| ImageAnalysis::sizes(upload.bytes.len(), prepared.png.len()));
        diagnostics::analyze(&prepared, analysis);

        let mut outcome = DecodeOutcome::failed(report, TicketError::NoBarcodeDetected);
        outcome.report.error = Some("No valid barcode detected after all attempts".to_string());
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgba, RgbaImage};
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct FixedStrategy {
        name: &'static str,
        result: Option<&'static str>,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl DecodeStrategy for FixedStrategy {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn decode(&self, _image: &PreparedImage) -> Result<String, DecodeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.result
                .map(str::to_string)
                .ok_or(DecodeError::NotDetected)
        }
    }

    fn png_upload(width: u32, height: u32) -> ImageUpload {
        let image = RgbaImage::from_pixel(width, height, Rgba([255, 255, 255, 255]));
        let mut buf = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .unwrap();
        ImageUpload {
            file_name: Some("blank.png".to_string()),
            content_type: "image/png".to_string(),
            bytes: Bytes::from(buf),
        }
    }

    fn strategy(
        name: &'static str,
        result: Option<&'static str>,
    ) -> (Box<dyn DecodeStrategy>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let strategy = FixedStrategy {
            name,
            result,
            calls: calls.clone(),
        };
        (Box::new(strategy), calls)
    }

    #[tokio::test]
    async fn test_chain_short_circuits_on_first_success() {
        let (first, first_calls) = strategy("first", None);
        let (second, _) = strategy("second", Some("123456789012"));
        let (third, third_calls) = strategy("third", Some("999"));
        let decoder = BarcodeImageDecoder::new(vec![first, second, third]);

        let outcome = decoder.decode(&png_upload(8, 8)).await;

        assert_eq!(outcome.result.unwrap(), "123456789012");
        assert_eq!(first_calls.load(Ordering::SeqCst), 1);
        assert_eq!(third_calls.load(Ordering::SeqCst), 0);
        assert_eq!(outcome.report.decode_attempts.len(), 2);
        assert_eq!(
            outcome.report.decoded_barcode.as_deref(),
            Some("123456789012")
        );
    }

    #[tokio::test]
    async fn test_blank_image_reports_no_barcode_with_diagnostics() {
        let decoder = BarcodeImageDecoder::new(vec![Box::new(LocalScanStrategy)]);

        let outcome = decoder.decode(&png_upload(64, 32)).await;

        assert!(matches!(outcome.result, Err(TicketError::NoBarcodeDetected)));
        let analysis = outcome.report.image_analysis.unwrap();
        let dimensions = analysis.dimensions.unwrap();
        assert_eq!((dimensions.width, dimensions.height), (64, 32));
        assert_eq!(analysis.format.as_deref(), Some("png"));
        assert!(analysis.sharpness.is_some());
        assert!(!outcome.report.decode_attempts[0].success);
        assert!(outcome.report.error.is_some());
    }

    #[tokio::test]
    async fn test_unsupported_media_type_is_rejected_before_decoding() {
        let (only, calls) = strategy("only", Some("1"));
        let decoder = BarcodeImageDecoder::new(vec![only]);
        let mut upload = png_upload(4, 4);
        upload.content_type = "application/pdf".to_string();

        let outcome = decoder.decode(&upload).await;

        assert!(matches!(
            outcome.result,
            Err(TicketError::UnsupportedMediaType(_))
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_corrupt_image_fails_processing() {
        let decoder = BarcodeImageDecoder::new(Vec::new());
        let upload = ImageUpload {
            file_name: None,
            content_type: "image/jpeg".to_string(),
            bytes: Bytes::from_static(b"definitely not a jpeg"),
        };

        let outcome = decoder.decode(&upload).await;

        assert!(matches!(
            outcome.result,
            Err(TicketError::ImageProcessingFailed(_))
        ));
        assert!(outcome.report.received_file);
    }

    #[tokio::test]
    async fn test_empty_upload_is_invalid() {
        let decoder = BarcodeImageDecoder::new(Vec::new());
        let upload = ImageUpload {
            file_name: None,
            content_type: "image/png".to_string(),
            bytes: Bytes::new(),
        };

        let outcome = decoder.decode(&upload).await;

        assert!(matches!(outcome.result, Err(TicketError::InvalidInput(_))));
        assert!(!outcome.report.received_file);
    }

    #[tokio::test]
    async fn test_media_type_is_checked_before_emptiness() {
        let decoder = BarcodeImageDecoder::new(Vec::new());
        let upload = ImageUpload {
            file_name: Some("logo.svg".to_string()),
            content_type: "image/svg+xml".to_string(),
            bytes: Bytes::new(),
        };

        let outcome = decoder.decode(&upload).await;

        assert!(matches!(
            outcome.result,
            Err(TicketError::UnsupportedMediaType(_))
        ));
    }

    #[test]
    fn test_default_chain_order() {
        let decoder =
            BarcodeImageDecoder::with_defaults(Some("http://localhost:1/decode"), Duration::from_secs(1))
                .unwrap();
        assert_eq!(decoder.strategy_names(), vec!["local-scan", "remote-service"]);

        let local_only = BarcodeImageDecoder::with_defaults(None, Duration::from_secs(1)).unwrap();
        assert_eq!(local_only.strategy_names(), vec!["local-scan"]);
    }
}
