//! Image encoding: validated upload → base64 `ImageData`.
//!
//! The original bytes are forwarded untouched. Re-encoding a phone photo of
//! handwriting would only add compression artefacts to the strokes the model
//! has to read. `detail: "high"` asks GPT-4-class models for the full tile
//! budget; small handwriting is lost at the single-tile `low` setting.

use crate::pipeline::input::ValidatedImage;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use tracing::debug;

/// Wrap a validated image as a base64 attachment for the vision model.
pub fn encode_image(image: &ValidatedImage) -> ImageData {
    let b64 = STANDARD.encode(&image.bytes);
    debug!(
        "Encoded '{}' → {} bytes base64 ({})",
        image.filename,
        b64.len(),
        image.encoding.mime_type()
    );

    ImageData::new(b64, image.encoding.mime_type()).with_detail("high")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::input::ImageEncoding;

    #[test]
    fn encode_keeps_mime_and_bytes() {
        let image = ValidatedImage {
            filename: "scan.jpg".into(),
            bytes: vec![0xFF, 0xD8, 0xFF, 0xE0],
            encoding: ImageEncoding::Jpeg,
            width: 1,
            height: 1,
        };
        let data = encode_image(&image);
        assert_eq!(data.mime_type, "image/jpeg");
        let decoded = STANDARD.decode(&data.data).expect("valid base64");
        assert_eq!(decoded, image.bytes);
    }
}
