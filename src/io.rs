use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use image::codecs::png::PngEncoder;
use image::{ImageEncoder, ImageError};

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("nothing to export yet")]
    NothingToExport,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("image error: {0}")]
    Image(#[from] ImageError),
    #[error("invalid data URI: {0}")]
    InvalidDataUri(String),
    #[error(transparent)]
    Canvas(#[from] crate::canvas::CanvasError),
}

/// `data:image/png;base64,...` for a PNG byte stream.
pub fn to_data_uri(png: &[u8]) -> String {
    format!("data:image/png;base64,{}", STANDARD.encode(png))
}

/// Split a base64 `data:` URI into its MIME type and decoded bytes.
pub fn decode_data_uri(uri: &str) -> Result<(String, Vec<u8>), ExportError> {
    let rest = uri
        .trim()
        .strip_prefix("data:")
        .ok_or_else(|| ExportError::InvalidDataUri("missing 'data:' prefix".into()))?;
    let (meta, payload) = rest
        .split_once(',')
        .ok_or_else(|| ExportError::InvalidDataUri("missing ',' separator".into()))?;
    let mime = meta
        .strip_suffix(";base64")
        .ok_or_else(|| ExportError::InvalidDataUri("only base64 payloads are supported".into()))?;
    let bytes = STANDARD
        .decode(payload)
        .map_err(|e| ExportError::InvalidDataUri(e.to_string()))?;
    Ok((mime.to_string(), bytes))
}

/// Decode any supported encoded image and write it to `path` as PNG.
///
/// Service results may come back as JPEG or WEBP; the saved file is always
/// a PNG so the default `.png` name stays honest.
pub fn export_png(encoded: &[u8], path: &Path) -> Result<(), ExportError> {
    let image = image::load_from_memory(encoded)?.into_rgba8();
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    let mut writer = BufWriter::new(File::create(path)?);
    PngEncoder::new(&mut writer).write_image(
        image.as_raw(),
        image.width(),
        image.height(),
        image::ColorType::Rgba8,
    )?;
    log::info!(
        "Exported {}x{} image to {}",
        image.width(),
        image.height(),
        path.display()
    );
    Ok(())
}
