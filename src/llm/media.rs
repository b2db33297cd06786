use std::io::Cursor;

use base64::{engine::general_purpose, Engine as _};
use chrono::{DateTime, Utc};
use image::ImageReader;

pub fn detect_mime_type(data: &[u8]) -> Option<String> {
    infer::get(data)
        .filter(|kind| kind.matcher_type() == infer::MatcherType::Image)
        .map(|kind| kind.mime_type().to_string())
}

fn normalize_image_mime_type(mime_type: &str) -> String {
    let lowered = mime_type.trim().to_ascii_lowercase();
    match lowered.as_str() {
        "image/jpg" | "image/pjpeg" => "image/jpeg".to_string(),
        "" => "image/jpeg".to_string(),
        _ => lowered,
    }
}

fn extension_for_mime(mime_type: &str) -> &'static str {
    match mime_type {
        "image/png" => "png",
        "image/webp" => "webp",
        _ => "jpg",
    }
}

/// The one image currently shown to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageArtifact {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

impl ImageArtifact {
    /// Sniffed bytes win over the declared type.
    pub fn new(bytes: Vec<u8>, declared_mime_type: Option<&str>) -> Self {
        let mime_type = detect_mime_type(&bytes)
            .or_else(|| declared_mime_type.map(|value| value.to_string()))
            .unwrap_or_else(|| "image/jpeg".to_string());
        Self {
            bytes,
            mime_type: normalize_image_mime_type(&mime_type),
        }
    }

    pub fn base64(&self) -> String {
        general_purpose::STANDARD.encode(&self.bytes)
    }

    pub fn data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.base64())
    }

    /// Pixel size read from the encoded header.
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        ImageReader::new(Cursor::new(&self.bytes))
            .with_guessed_format()
            .ok()?
            .into_dimensions()
            .ok()
    }

    pub fn extension(&self) -> &'static str {
        extension_for_mime(&self.mime_type)
    }

    pub fn download_file_name(&self, at: DateTime<Utc>) -> String {
        format!(
            "influencer-{}.{}",
            at.format("%Y%m%d-%H%M%S"),
            self.extension()
        )
    }
}

#[cfg(test)]
pub(crate) fn sample_jpeg(width: u32, height: u32) -> Vec<u8> {
    let image = image::RgbImage::from_pixel(width, height, image::Rgb([200, 120, 40]));
    let mut buffer = Cursor::new(Vec::new());
    image
        .write_to(&mut buffer, image::ImageFormat::Jpeg)
        .unwrap();
    buffer.into_inner()
}
