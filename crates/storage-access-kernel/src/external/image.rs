//! Image normalization into a document directory.
//!
//! Decoding, EXIF reading and JPEG encoding belong to the platform codec
//! behind [`ImageCodec`]. The backend only rotates pixels, picks the target
//! name and manages the `.nomedia` sentinel.

use std::io;
use std::sync::Arc;

use storage_access_types::{StorageError, StorageResult};
use thiserror::Error;

use super::{ExternalBackend, provider_error};
use crate::pool::join_error;
use crate::uri::DocumentUri;

/// Sentinel that keeps the media scanner out of a directory.
pub const NOMEDIA: &str = ".nomedia";

const NOMEDIA_MIME: &str = "application/octet-stream";
const JPEG_MIME: &str = "image/jpeg";

/// Codec failures.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("failed to decode image: {0}")]
    Decode(String),
    #[error("failed to encode jpeg: {0}")]
    Encode(String),
    #[error("no image codec available")]
    Unavailable,
}

impl From<CodecError> for StorageError {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::Unavailable => StorageError::Unsupported(err.to_string()),
            _ => StorageError::Io(err.to_string()),
        }
    }
}

/// Decoded RGBA8 pixels, row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

impl DecodedImage {
    fn pixel(&self, x: u32, y: u32) -> &[u8] {
        let start = pixel_offset(self.width, x, y);
        &self.rgba[start..start + 4]
    }
}

/// Byte offset of RGBA pixel `(x, y)` in a row-major buffer `width` wide.
fn pixel_offset(width: u32, x: u32, y: u32) -> usize {
    (y as usize * width as usize + x as usize) * 4
}

/// Platform image codec.
pub trait ImageCodec: Send + Sync {
    fn decode(&self, bytes: &[u8]) -> Result<DecodedImage, CodecError>;

    /// Raw EXIF orientation tag (1–8), if the image carries one.
    fn orientation(&self, bytes: &[u8]) -> Option<u16>;

    /// Encode as JPEG; `quality` is 1–100.
    fn encode_jpeg(&self, image: &DecodedImage, quality: u8) -> Result<Vec<u8>, CodecError>;
}

/// Codec for hosts that have none; conversion is `Unsupported`.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableCodec;

impl ImageCodec for UnavailableCodec {
    fn decode(&self, _bytes: &[u8]) -> Result<DecodedImage, CodecError> {
        Err(CodecError::Unavailable)
    }

    fn orientation(&self, _bytes: &[u8]) -> Option<u16> {
        None
    }

    fn encode_jpeg(&self, _image: &DecodedImage, _quality: u8) -> Result<Vec<u8>, CodecError> {
        Err(CodecError::Unavailable)
    }
}

/// Clockwise rotation derived from an EXIF orientation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rotation {
    None,
    Cw90,
    Cw180,
    Cw270,
}

impl Rotation {
    /// Only the pure rotations (3, 6, 8) are honored; mirrored orientations
    /// are left as they are.
    pub fn from_exif(tag: Option<u16>) -> Self {
        match tag {
            Some(3) => Rotation::Cw180,
            Some(6) => Rotation::Cw90,
            Some(8) => Rotation::Cw270,
            _ => Rotation::None,
        }
    }

    pub fn degrees(&self) -> u16 {
        match self {
            Rotation::None => 0,
            Rotation::Cw90 => 90,
            Rotation::Cw180 => 180,
            Rotation::Cw270 => 270,
        }
    }

    pub fn apply(&self, image: DecodedImage) -> StorageResult<DecodedImage> {
        let (w, h) = (image.width, image.height);
        if image.rgba.len() != (w as usize) * (h as usize) * 4 {
            return Err(StorageError::Io(format!(
                "decoded image is {} bytes, expected {w}x{h} RGBA",
                image.rgba.len()
            )));
        }
        let (out_w, out_h) = match self {
            Rotation::None => return Ok(image),
            Rotation::Cw180 => (w, h),
            Rotation::Cw90 | Rotation::Cw270 => (h, w),
        };

        let mut rgba = vec![0u8; image.rgba.len()];
        for y in 0..h {
            for x in 0..w {
                let (dx, dy) = match self {
                    Rotation::Cw90 => (h - 1 - y, x),
                    Rotation::Cw180 => (w - 1 - x, h - 1 - y),
                    Rotation::Cw270 => (y, w - 1 - x),
                    Rotation::None => (x, y),
                };
                let dst = pixel_offset(out_w, dx, dy);
                rgba[dst..dst + 4].copy_from_slice(image.pixel(x, y));
            }
        }
        Ok(DecodedImage {
            width: out_w,
            height: out_h,
            rgba,
        })
    }
}

impl ExternalBackend {
    /// Re-encode `source` as `filename.jpg` in `dest_dir`, upright.
    ///
    /// An existing `filename.jpg` is replaced. The destination gets a
    /// `.nomedia` sentinel if it has none.
    pub async fn convert_to_jpg_and_copy(
        &self,
        source: &str,
        dest_dir: &str,
        filename: &str,
    ) -> StorageResult<String> {
        let (dest, _) = self.directory(dest_dir, "destination directory").await?;
        self.ensure_nomedia(&dest).await?;

        let (src, _) = self.file(source).await?;
        let bytes = self
            .provider
            .read(&src)
            .await
            .map_err(|e| provider_error(source, e))?;

        let codec = Arc::clone(&self.codec);
        let quality = self.jpeg_quality;
        let (jpeg, rotation) = self
            .handle
            .spawn_blocking(move || -> StorageResult<(Vec<u8>, Rotation)> {
                let rotation = Rotation::from_exif(codec.orientation(&bytes));
                let decoded = codec.decode(&bytes)?;
                let upright = rotation.apply(decoded)?;
                Ok((codec.encode_jpeg(&upright, quality)?, rotation))
            })
            .await
            .map_err(join_error)??;

        let target = format!("{filename}.jpg");
        let children = self
            .provider
            .children(&dest)
            .await
            .map_err(|e| provider_error(dest_dir, e))?;
        if let Some(existing) = children
            .iter()
            .find(|c| !c.is_directory() && c.display_name == target)
        {
            self.provider
                .delete(&existing.uri)
                .await
                .map_err(|e| provider_error(format!("could not replace {target}"), e))?;
        }

        let created = self
            .provider
            .create(&dest, JPEG_MIME, &target)
            .await
            .map_err(|e| StorageError::CreationFailed(format!("could not create {target} in {dest_dir}: {e}")))?;
        self.provider
            .write(&created, &jpeg)
            .await
            .map_err(|e| provider_error(&created, e))?;

        tracing::info!(
            %source,
            target = %created,
            degrees = rotation.degrees(),
            bytes = jpeg.len(),
            "image converted"
        );
        Ok(created.to_string())
    }

    async fn ensure_nomedia(&self, dir: &DocumentUri) -> StorageResult<()> {
        let children = match self.provider.children(dir).await {
            Ok(children) => children,
            Err(e) if e.kind() == io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(provider_error(dir, e)),
        };
        if children.iter().any(|c| c.display_name == NOMEDIA) {
            return Ok(());
        }
        self.provider
            .create(dir, NOMEDIA_MIME, NOMEDIA)
            .await
            .map_err(|e| StorageError::CreationFailed(format!("could not create {NOMEDIA}: {e}")))?;
        tracing::debug!(%dir, "created .nomedia sentinel");
        Ok(())
    }
}
