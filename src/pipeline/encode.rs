//! Image encoding: `DynamicImage` → base64 JPEG wrapped in `ImageData`.
//!
//! Pages are sent as JPEG at quality 85: scanned and rendered text stays
//! legible at that level while uploads stay a fraction of the PNG size.
//! `detail: "high"` lets GPT-4-class models tile the image at full resolution;
//! `low` collapses it to a single 512 px overview and loses fine print.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::codecs::jpeg::JpegEncoder;
use image::DynamicImage;
use tracing::debug;

/// JPEG quality used for page images.
pub const JPEG_QUALITY: u8 = 85;

/// Encode a rendered page for the vision service.
pub fn encode_page(img: &DynamicImage) -> Result<ImageData, image::ImageError> {
    let mut buf = Vec::new();
    // JPEG has no alpha channel.
    let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
    rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut buf, JPEG_QUALITY))?;

    let b64 = STANDARD.encode(&buf);
    debug!("Encoded image → {} bytes base64", b64.len());

    Ok(ImageData::new(b64, "image/jpeg").with_detail("high"))
}
