//! Image ingress: validate an upload before any model call is made.
//!
//! Checks run cheapest first so a bad upload is rejected without decoding:
//!
//! 1. filename present
//! 2. extension on the allow-list (case-insensitive)
//! 3. size ≤ `max_image_bytes` (inclusive)
//! 4. non-empty
//! 5. bytes decode as an image
//! 6. decoded encoding is PNG or JPEG
//!
//! Steps 1–3 are exposed separately as [`check_upload`] for callers (an
//! HTTP layer, say) that know the size before they have the bytes.

use crate::config::AnalysisConfig;
use crate::error::Icd10Error;
use image::ImageFormat;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Raw image bytes plus the filename the caller claimed for them.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl ImageUpload {
    pub fn new(filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            bytes,
        }
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// The encodings the extractor accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageEncoding {
    Png,
    Jpeg,
}

impl ImageEncoding {
    pub fn mime_type(self) -> &'static str {
        match self {
            ImageEncoding::Png => "image/png",
            ImageEncoding::Jpeg => "image/jpeg",
        }
    }
}

/// An upload that passed every ingress check.
#[derive(Debug, Clone)]
pub struct ValidatedImage {
    pub filename: String,
    pub bytes: Vec<u8>,
    pub encoding: ImageEncoding,
    pub width: u32,
    pub height: u32,
}

/// The extension after the last `.`, if the name has one.
pub fn extension_of(filename: &str) -> Option<&str> {
    filename
        .rsplit_once('.')
        .map(|(_, ext)| ext)
        .filter(|ext| !ext.is_empty())
}

/// Filename and size checks that need no image bytes.
pub fn check_upload(filename: &str, size: u64, config: &AnalysisConfig) -> Result<(), Icd10Error> {
    if filename.trim().is_empty() {
        return Err(Icd10Error::MissingFilename);
    }

    let allowed = extension_of(filename).is_some_and(|ext| config.allows_extension(ext));
    if !allowed {
        return Err(Icd10Error::UnsupportedExtension {
            filename: filename.to_string(),
            allowed: config.allowed_extensions.join(", "),
        });
    }

    if size > config.max_image_bytes {
        return Err(Icd10Error::FileTooLarge {
            size,
            max: config.max_image_bytes,
        });
    }

    Ok(())
}

/// Run every ingress check and decode the image once to prove it is sound.
///
/// Decoding is CPU-bound; async callers should run this in `spawn_blocking`.
pub fn validate_image(
    upload: ImageUpload,
    config: &AnalysisConfig,
) -> Result<ValidatedImage, Icd10Error> {
    check_upload(&upload.filename, upload.size(), config)?;

    if upload.bytes.is_empty() {
        return Err(Icd10Error::EmptyImage {
            filename: upload.filename,
        });
    }

    let format = image::guess_format(&upload.bytes).map_err(|e| Icd10Error::UndecodableImage {
        filename: upload.filename.clone(),
        detail: e.to_string(),
    })?;

    let encoding = match format {
        ImageFormat::Png => ImageEncoding::Png,
        ImageFormat::Jpeg => ImageEncoding::Jpeg,
        other => {
            return Err(Icd10Error::UnsupportedEncoding {
                filename: upload.filename,
                format: format!("{other:?}"),
            })
        }
    };

    let decoded = image::load_from_memory_with_format(&upload.bytes, format).map_err(|e| {
        Icd10Error::UndecodableImage {
            filename: upload.filename.clone(),
            detail: e.to_string(),
        }
    })?;

    debug!(
        "Validated '{}': {:?} {}x{}, {} bytes",
        upload.filename,
        encoding,
        decoded.width(),
        decoded.height(),
        upload.bytes.len()
    );

    Ok(ValidatedImage {
        filename: upload.filename,
        width: decoded.width(),
        height: decoded.height(),
        bytes: upload.bytes,
        encoding,
    })
}

/// Read an image from disk into an [`ImageUpload`].
///
/// The size limit is checked against file metadata before the bytes are
/// read, so an oversized file is never loaded into memory.
pub async fn load_image_file(
    path: impl AsRef<Path>,
    config: &AnalysisConfig,
) -> Result<ImageUpload, Icd10Error> {
    let path = path.as_ref();
    let meta = tokio::fs::metadata(path)
        .await
        .map_err(|e| io_to_input_error(e, path))?;

    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    check_upload(&filename, meta.len(), config)?;

    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| io_to_input_error(e, path))?;

    debug!("Loaded image file: {}", path.display());
    Ok(ImageUpload::new(filename, bytes))
}

fn io_to_input_error(e: std::io::Error, path: &Path) -> Icd10Error {
    match e.kind() {
        std::io::ErrorKind::PermissionDenied => Icd10Error::PermissionDenied {
            path: PathBuf::from(path),
        },
        std::io::ErrorKind::NotFound => Icd10Error::FileNotFound {
            path: PathBuf::from(path),
        },
        _ => Icd10Error::Internal(format!("Failed to read '{}': {}", path.display(), e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, Rgba, RgbaImage};
    use std::io::Cursor;

    fn png_bytes() -> Vec<u8> {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(4, 4, Rgba([0, 0, 0, 255])));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .expect("png encode");
        buf
    }

    #[test]
    fn test_extension_of() {
        assert_eq!(extension_of("scan.jpg"), Some("jpg"));
        assert_eq!(extension_of("a.b.PNG"), Some("PNG"));
        assert_eq!(extension_of("noext"), None);
        assert_eq!(extension_of("trailing."), None);
    }

    #[test]
    fn gif_extension_rejected_regardless_of_content() {
        let config = AnalysisConfig::default();
        let err = validate_image(ImageUpload::new("scan.GIF", png_bytes()), &config).unwrap_err();
        assert!(matches!(err, Icd10Error::UnsupportedExtension { .. }), "got {err:?}");
    }

    #[test]
    fn extension_check_is_case_insensitive() {
        let config = AnalysisConfig::default();
        assert!(check_upload("SCAN.JPEG", 10, &config).is_ok());
        assert!(check_upload("scan.Png", 10, &config).is_ok());
    }

    #[test]
    fn size_limit_is_inclusive() {
        let config = AnalysisConfig::default();
        let max = config.max_image_bytes;
        assert!(check_upload("scan.jpg", max, &config).is_ok());
        let err = check_upload("scan.jpg", max + 1, &config).unwrap_err();
        assert!(matches!(err, Icd10Error::FileTooLarge { .. }));
    }

    #[test]
    fn exact_size_image_accepted_one_over_rejected() {
        let bytes = png_bytes();
        let len = bytes.len() as u64;

        let exact = AnalysisConfig::builder().max_image_bytes(len).build().unwrap();
        let ok = validate_image(ImageUpload::new("scan.png", bytes.clone()), &exact)
            .expect("exact size accepted");
        assert_eq!(ok.encoding, ImageEncoding::Png);
        assert_eq!((ok.width, ok.height), (4, 4));

        let tight = AnalysisConfig::builder()
            .max_image_bytes(len - 1)
            .build()
            .unwrap();
        let err = validate_image(ImageUpload::new("scan.png", bytes), &tight).unwrap_err();
        assert!(matches!(err, Icd10Error::FileTooLarge { .. }));
    }

    #[test]
    fn empty_filename_rejected() {
        let err = check_upload("", 10, &AnalysisConfig::default()).unwrap_err();
        assert!(matches!(err, Icd10Error::MissingFilename));
    }

    #[test]
    fn garbage_bytes_rejected_as_undecodable() {
        let err = validate_image(
            ImageUpload::new("scan.jpg", b"definitely not an image".to_vec()),
            &AnalysisConfig::default(),
        )
        .unwrap_err();
        assert!(err.is_invalid_input());
        assert!(matches!(err, Icd10Error::UndecodableImage { .. }), "got {err:?}");
    }

    #[test]
    fn empty_bytes_rejected() {
        let err = validate_image(ImageUpload::new("scan.jpg", vec![]), &AnalysisConfig::default())
            .unwrap_err();
        assert!(matches!(err, Icd10Error::EmptyImage { .. }));
    }

    #[test]
    fn gif_bytes_under_png_name_rejected_as_wrong_encoding() {
        let gif = b"GIF89a\x01\x00\x01\x00\x00\x00\x00;".to_vec();
        let err = validate_image(ImageUpload::new("scan.png", gif), &AnalysisConfig::default())
            .unwrap_err();
        assert!(matches!(err, Icd10Error::UnsupportedEncoding { .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn missing_file_is_file_not_found() {
        let err = load_image_file("/definitely/not/here.jpg", &AnalysisConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Icd10Error::FileNotFound { .. }));
    }

    #[tokio::test]
    async fn load_reads_bytes_and_filename() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("note.png");
        std::fs::write(&path, png_bytes()).unwrap();

        let upload = load_image_file(&path, &AnalysisConfig::default())
            .await
            .expect("load");
        assert_eq!(upload.filename, "note.png");
        assert_eq!(upload.bytes, png_bytes());
    }
}
