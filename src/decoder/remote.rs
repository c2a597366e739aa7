//! Fallback decoding through a third-party web decoder.
//!
//! The service answers with HTML (or JSON) meant for humans, so the barcode is
//! scraped with an ordered list of patterns. This is fragile by nature: a
//! markup change on the remote side silently turns every call into
//! `NotDetected`. Replace it with a proper API client behind the same
//! [`DecodeStrategy`] trait when one is available.

use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::multipart::{Form, Part};
use tracing::{debug, warn};

use super::{DecodeError, DecodeStrategy, PreparedImage};

pub const DEFAULT_REMOTE_DECODER_URL: &str = "https://zxing.org/w/decode";
pub const DEFAULT_REMOTE_TIMEOUT_SECS: u64 = 7;

/// Tried in order; the first capture wins.
const EXTRACTION_PATTERNS: [&str; 5] = [
    r#""rawText"\s*:\s*"([^"]+)""#,
    r"Parsed Result(?:</strong>|</td>)?\s*(?:<td>)?\s*<pre[^>]*>([^<]+)</pre>",
    r"Raw text(?:</strong>|</td>)?\s*(?:<td>)?\s*<pre[^>]*>([^<]+)</pre>",
    r"Parsed Text:\s*<code>([^<]+)</code>",
    r"Text:\s*<code>([^<]+)</code>",
];

pub struct RemoteDecodeStrategy {
    client: reqwest::Client,
    endpoint: String,
    timeout: Duration,
    patterns: Vec<Regex>,
}

impl RemoteDecodeStrategy {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        let patterns = EXTRACTION_PATTERNS
            .iter()
            .filter_map(|pattern| match Regex::new(pattern) {
                Ok(regex) => Some(regex),
                Err(e) => {
                    warn!(%pattern, error = %e, "Skipping invalid extraction pattern");
                    None
                }
            })
            .collect();

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            timeout,
            patterns,
        })
    }

    /// First non-empty capture of the first matching pattern.
    pub fn extract(&self, body: &str) -> Option<String> {
        self.patterns.iter().find_map(|pattern| {
            pattern
                .captures(body)
                .and_then(|captures| captures.get(1))
                .map(|m| m.as_str().trim().to_string())
                .filter(|text| !text.is_empty())
        })
    }

    async fn fetch(&self, png: Vec<u8>) -> Result<String, DecodeError> {
        let part = Part::bytes(png)
            .file_name("barcode.png")
            .mime_str("image/png")
            .map_err(|e| DecodeError::Request(e.to_string()))?;
        let form = Form::new().part("file", part);

        let response = self
            .client
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .await
            .map_err(|e| self.request_error(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DecodeError::Status(status.as_u16()));
        }
        response.text().await.map_err(|e| self.request_error(e))
    }

    fn request_error(&self, err: reqwest::Error) -> DecodeError {
        if err.is_timeout() {
            DecodeError::Timeout(self.timeout)
        } else {
            DecodeError::Request(err.to_string())
        }
    }
}

#[async_trait]
impl DecodeStrategy for RemoteDecodeStrategy {
    fn name(&self) -> &'static str {
        "remote-service"
    }

    async fn decode(&self, image: &PreparedImage) -> Result<String, DecodeError> {
        let body = tokio::time::timeout(self.timeout, self.fetch(image.png.clone()))
            .await
            .map_err(|_| DecodeError::Timeout(self.timeout))??;

        match self.extract(&body) {
            Some(text) => Ok(text),
            None => {
                debug!(
                    endpoint = %self.endpoint,
                    sample = %body.chars().take(200).collect::<String>(),
                    "Remote decoder response had no recognizable barcode"
                );
                Err(DecodeError::NotDetected)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::preprocess::prepare;
    use image::{DynamicImage, ImageFormat, RgbImage};
    use std::io::Cursor;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn strategy(endpoint: &str, timeout: Duration) -> RemoteDecodeStrategy {
        RemoteDecodeStrategy::new(endpoint, timeout).unwrap()
    }

    fn prepared() -> PreparedImage {
        let mut buf = Vec::new();
        DynamicImage::ImageRgb8(RgbImage::new(4, 4))
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .unwrap();
        prepare(&buf).unwrap()
    }

    #[test]
    fn test_extracts_json_raw_text() {
        let remote = strategy("http://unused", Duration::from_secs(1));
        let body = r#"{"format":"EAN_13","rawText":"123456789012"}"#;
        assert_eq!(remote.extract(body).as_deref(), Some("123456789012"));
    }

    #[test]
    fn test_extracts_html_table_layout() {
        let remote = strategy("http://unused", Duration::from_secs(1));
        let body = "<tr><td>Raw text</td><td><pre style=\"margin:0\">987654321098</pre></td></tr>";
        assert_eq!(remote.extract(body).as_deref(), Some("987654321098"));
    }

    #[test]
    fn test_pattern_order_wins_over_position() {
        let remote = strategy("http://unused", Duration::from_secs(1));
        let body = "<td>Raw text</td><td><pre>raw-value</pre></td>\
                    <td>Parsed Result</td><td><pre> parsed-value </pre></td>";
        assert_eq!(remote.extract(body).as_deref(), Some("parsed-value"));
    }

    #[test]
    fn test_unrecognized_body() {
        let remote = strategy("http://unused", Duration::from_secs(1));
        assert!(remote.extract("<html>No barcode was found</html>").is_none());
    }

    #[tokio::test]
    async fn test_decodes_remote_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/w/decode"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("<strong>Parsed Result</strong> <pre>111122223333</pre>"),
            )
            .mount(&server)
            .await;
        let remote = strategy(&format!("{}/w/decode", server.uri()), Duration::from_secs(2));

        let decoded = remote.decode(&prepared()).await.unwrap();

        assert_eq!(decoded, "111122223333");
    }

    #[tokio::test]
    async fn test_error_status_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
        let remote = strategy(&server.uri(), Duration::from_secs(2));

        let result = remote.decode(&prepared()).await;

        assert!(matches!(result, Err(DecodeError::Status(503))));
    }

    #[tokio::test]
    async fn test_slow_service_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(r#"{"rawText":"late"}"#)
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&server)
            .await;
        let remote = strategy(&server.uri(), Duration::from_millis(200));

        let result = remote.decode(&prepared()).await;

        assert!(matches!(result, Err(DecodeError::Timeout(_))));
    }
}
