//! Sprite fetching and base64 encoding.

use std::io::Cursor;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::{ImageFormat, ImageReader};

use crate::catalog::ApiEndpoints;
use crate::error::ImageError;
use crate::http::HttpClient;

/// Formats accepted for sprites.
pub const ALLOWED_FORMATS: &[ImageFormat] = &[
    ImageFormat::Png,
    ImageFormat::Jpeg,
    ImageFormat::Gif,
    ImageFormat::WebP,
];

/// Maximum sprite size (10MB).
pub const MAX_FILE_SIZE: usize = 10 * 1024 * 1024;

/// How the encoded image is handed back.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ImageOutput {
    /// Plain base64 of the raw bytes.
    #[default]
    Base64,
    /// `data:<mime>;base64,...` URI.
    DataUri,
}

/// Detect the image format from magic bytes.
///
/// Returns the MIME type on success (e.g., "image/png").
pub fn validate_image(data: &[u8]) -> Result<&'static str, ImageError> {
    let reader = ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .map_err(|e| ImageError::UnsupportedFormat(e.to_string()))?;

    let format = reader
        .format()
        .ok_or_else(|| ImageError::UnsupportedFormat("could not detect image format".to_string()))?;

    if !ALLOWED_FORMATS.contains(&format) {
        return Err(ImageError::UnsupportedFormat(format!(
            "{:?} (allowed: PNG, JPEG, GIF, WebP)",
            format
        )));
    }

    Ok(format.to_mime_type())
}

/// Fetch the sprite at `url` and encode it.
///
/// A missing or empty URL yields an empty string without any request.
pub async fn encode_image<C: HttpClient + ?Sized>(
    client: &C,
    endpoints: &ApiEndpoints,
    url: Option<&str>,
    output: ImageOutput,
) -> Result<String, ImageError> {
    let Some(url) = url.map(str::trim).filter(|u| !u.is_empty()) else {
        return Ok(String::new());
    };

    let url = endpoints.resolve(url)?;
    let data = client.fetch_bytes(&url).await?;

    if data.len() > MAX_FILE_SIZE {
        return Err(ImageError::TooLarge {
            size: data.len(),
            max: MAX_FILE_SIZE,
        });
    }

    let mime = validate_image(&data)?;
    let encoded = STANDARD.encode(&data);

    Ok(match output {
        ImageOutput::Base64 => encoded,
        ImageOutput::DataUri => format!("data:{};base64,{}", mime, encoded),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;
    use crate::http::MockClient;

    const ROOT: &str = "http://stub.test/api/v2";
    const SPRITE: &str = "http://stub.test/sprites/1.png";

    fn png() -> Vec<u8> {
        STANDARD
            .decode("iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAQAAAC1HAwCAAAAC0lEQVR42mNkYAAAAAYAAjCB0C8AAAAASUVORK5CYII=")
            .unwrap()
    }

    #[test]
    fn test_validate_png() {
        assert_eq!(validate_image(&png()).unwrap(), "image/png");
    }

    #[test]
    fn test_validate_invalid_format() {
        assert!(matches!(
            validate_image(b"not an image"),
            Err(ImageError::UnsupportedFormat(_))
        ));
    }

    #[tokio::test]
    async fn test_encode_round_trips_bytes() {
        let client = MockClient::new().with_bytes(SPRITE, png());
        let endpoints = ApiEndpoints::new(ROOT);

        let encoded = encode_image(&client, &endpoints, Some(SPRITE), ImageOutput::Base64)
            .await
            .unwrap();
        assert_eq!(STANDARD.decode(&encoded).unwrap(), png());
    }

    #[tokio::test]
    async fn test_data_uri_output() {
        let client = MockClient::new().with_bytes(SPRITE, png());
        let endpoints = ApiEndpoints::new(ROOT);

        let encoded = encode_image(&client, &endpoints, Some(SPRITE), ImageOutput::DataUri)
            .await
            .unwrap();
        assert!(encoded.starts_with("data:image/png;base64,iVBORw0KGgo"));
    }

    #[tokio::test]
    async fn test_missing_image_is_empty_without_request() {
        let client = MockClient::new();
        let endpoints = ApiEndpoints::new(ROOT);

        assert_eq!(
            encode_image(&client, &endpoints, None, ImageOutput::Base64)
                .await
                .unwrap(),
            ""
        );
        assert_eq!(
            encode_image(&client, &endpoints, Some("  "), ImageOutput::Base64)
                .await
                .unwrap(),
            ""
        );
        assert!(client.requests().is_empty());
    }

    #[tokio::test]
    async fn test_relative_sprite_url() {
        let client = MockClient::new().with_bytes(SPRITE, png());
        let endpoints = ApiEndpoints::new(ROOT);

        assert!(
            encode_image(&client, &endpoints, Some("/sprites/1.png"), ImageOutput::Base64)
                .await
                .is_ok()
        );
        assert_eq!(client.requests(), vec![SPRITE]);
    }

    #[tokio::test]
    async fn test_fetch_failure() {
        let client = MockClient::new().with_status(SPRITE, 404);
        let endpoints = ApiEndpoints::new(ROOT);

        let err = encode_image(&client, &endpoints, Some(SPRITE), ImageOutput::Base64)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ImageError::Fetch(FetchError::UnexpectedStatus { status: 404, .. })
        ));
    }

    #[tokio::test]
    async fn test_non_image_payload() {
        let client = MockClient::new().with_bytes(SPRITE, b"<html>gone</html>".to_vec());
        let endpoints = ApiEndpoints::new(ROOT);

        let err = encode_image(&client, &endpoints, Some(SPRITE), ImageOutput::Base64)
            .await
            .unwrap_err();
        assert!(matches!(err, ImageError::UnsupportedFormat(_)));
    }
}
