//! Image normalisation: arbitrary cover bytes → uniform RGB JPEG.
//!
//! Covers arrive as JPEG, PNG (often with alpha), GIF or WebP in any size.
//! Each one is decoded, flattened to RGB, resampled to the oversampled cell
//! size, optionally framed, and written to the scratch directory as JPEG so
//! the compositor can embed the bytes without re-encoding.
//!
//! Decoding and Lanczos resampling are CPU-bound, so [`fetch_and_normalize`]
//! moves them onto the blocking pool.

use crate::error::ItemError;
use crate::pipeline::fetch::{download, Fetcher};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{DynamicImage, Rgb, RgbImage};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Frame colour drawn when bordering is enabled.
pub const BORDER_GRAY: Rgb<u8> = Rgb([128, 128, 128]);

/// Frame thickness on each side, in pixels.
pub const BORDER_PX: u32 = 1;

/// A cover written to scratch, ready for placement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedImage {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
}

/// How covers are reshaped and encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NormalizeOptions {
    /// Resample target before the border, in pixels.
    pub target: (u32, u32),
    pub border: bool,
    pub jpeg_quality: u8,
}

/// Download `image_url` and write the normalised cover to `dest`.
pub async fn fetch_and_normalize(
    fetcher: &dyn Fetcher,
    image_url: &str,
    dest: &Path,
    options: NormalizeOptions,
) -> Result<NormalizedImage, ItemError> {
    let bytes = download(fetcher, image_url).await?;
    debug!("Downloaded {} ({} bytes)", image_url, bytes.len());

    let url = image_url.to_string();
    let dest = dest.to_path_buf();
    tokio::task::spawn_blocking(move || normalize_bytes(&bytes, &url, &dest, options))
        .await
        .map_err(|e| worker_failed(image_url, e))?
}

fn worker_failed(url: &str, e: tokio::task::JoinError) -> ItemError {
    let detail = if e.is_panic() {
        format!("normalise task panicked: {e}")
    } else {
        e.to_string()
    };
    ItemError::Worker {
        url: url.to_string(),
        detail,
    }
}

/// Blocking implementation: decode, reshape, encode, write.
pub fn normalize_bytes(
    bytes: &[u8],
    url: &str,
    dest: &Path,
    options: NormalizeOptions,
) -> Result<NormalizedImage, ItemError> {
    let decoded = image::load_from_memory(bytes).map_err(|e| ItemError::Decode {
        url: url.to_string(),
        detail: e.to_string(),
    })?;
    debug!(
        "Decoded {} → {}x{} {:?}",
        url,
        decoded.width(),
        decoded.height(),
        decoded.color()
    );

    let cover = normalize_image(&decoded, options.target, options.border);
    let jpeg = encode_jpeg(&cover, options.jpeg_quality).map_err(|e| ItemError::Encode {
        path: dest.to_path_buf(),
        detail: e.to_string(),
    })?;
    std::fs::write(dest, &jpeg).map_err(|e| ItemError::Encode {
        path: dest.to_path_buf(),
        detail: e.to_string(),
    })?;

    Ok(NormalizedImage {
        path: dest.to_path_buf(),
        width: cover.width(),
        height: cover.height(),
    })
}

/// Flatten to RGB, resample to `target`, and optionally frame.
///
/// Alpha is discarded, not composited: a transparent pixel keeps whatever
/// RGB value it carried.
pub fn normalize_image(img: &DynamicImage, target: (u32, u32), border: bool) -> RgbImage {
    let rgb = img.to_rgb8();
    let resized = imageops::resize(&rgb, target.0, target.1, FilterType::Lanczos3);
    if border {
        add_border(&resized)
    } else {
        resized
    }
}

fn add_border(img: &RgbImage) -> RgbImage {
    let mut canvas = RgbImage::from_pixel(
        img.width() + 2 * BORDER_PX,
        img.height() + 2 * BORDER_PX,
        BORDER_GRAY,
    );
    imageops::replace(&mut canvas, img, i64::from(BORDER_PX), i64::from(BORDER_PX));
    canvas
}

/// Encode as baseline JPEG.
pub fn encode_jpeg(img: &RgbImage, quality: u8) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Vec::new();
    img.write_with_encoder(JpegEncoder::new_with_quality(&mut buf, quality))?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GenericImageView, Rgba, RgbaImage};
    use std::io::Cursor;

    fn close(a: u8, b: u8) -> bool {
        a.abs_diff(b) <= 2
    }

    #[test]
    fn alpha_is_dropped_and_colour_kept() {
        let mut rgba = RgbaImage::from_pixel(40, 60, Rgba([200, 30, 90, 255]));
        for x in 0..40 {
            for y in 0..30 {
                rgba.put_pixel(x, y, Rgba([200, 30, 90, 0]));
            }
        }
        let out = normalize_image(&DynamicImage::ImageRgba8(rgba), (20, 30), false);
        assert_eq!(out.dimensions(), (20, 30));
        for p in out.pixels() {
            assert!(close(p[0], 200) && close(p[1], 30) && close(p[2], 90), "pixel {p:?}");
        }
    }

    #[test]
    fn output_size_is_exact_target() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(500, 333, Rgb([1, 2, 3])));
        let out = normalize_image(&img, (170, 242), false);
        assert_eq!(out.dimensions(), (170, 242));
    }

    #[test]
    fn border_adds_one_gray_pixel_per_side() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(10, 10, Rgb([255, 255, 255])));
        let out = normalize_image(&img, (170, 242), true);
        assert_eq!(out.dimensions(), (172, 244));
        assert_eq!(*out.get_pixel(0, 0), BORDER_GRAY);
        assert_eq!(*out.get_pixel(171, 243), BORDER_GRAY);
        assert_eq!(*out.get_pixel(0, 100), BORDER_GRAY);
        let inner = out.get_pixel(1, 1);
        assert!(close(inner[0], 255), "inner {inner:?}");
    }

    #[test]
    fn jpeg_round_trip_is_three_channel() {
        let img = RgbImage::from_pixel(16, 16, Rgb([10, 120, 240]));
        let bytes = encode_jpeg(&img, 95).unwrap();
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
        let back = image::load_from_memory(&bytes).unwrap();
        assert_eq!(back.color(), image::ColorType::Rgb8);
        assert_eq!(back.dimensions(), (16, 16));
    }

    #[test]
    fn normalize_bytes_writes_scratch_file() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("1.jpg");

        let mut png = Vec::new();
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(64, 64, Rgba([0, 0, 0, 128])))
            .write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();

        let options = NormalizeOptions {
            target: (170, 242),
            border: true,
            jpeg_quality: 95,
        };
        let out = normalize_bytes(&png, "mem://cover.png", &dest, options).unwrap();
        assert_eq!((out.width, out.height), (172, 244));
        let on_disk = image::open(&dest).unwrap();
        assert_eq!(on_disk.dimensions(), (172, 244));
        assert!(!on_disk.color().has_alpha());
    }

    #[test]
    fn garbage_bytes_are_a_decode_error() {
        let dir = tempfile::tempdir().unwrap();
        let options = NormalizeOptions {
            target: (10, 10),
            border: false,
            jpeg_quality: 95,
        };
        let err = normalize_bytes(b"<html>not an image</html>", "u", &dir.path().join("x.jpg"), options)
            .unwrap_err();
        assert!(matches!(err, ItemError::Decode { .. }));
        assert!(!dir.path().join("x.jpg").exists());
    }

    #[tokio::test]
    async fn panicking_worker_is_not_reported_as_decode_error() {
        let join = tokio::task::spawn_blocking(|| panic!("resize blew up"))
            .await
            .unwrap_err();
        let err = worker_failed("https://cdn.example/a.png", join);
        assert!(matches!(err, ItemError::Worker { ref url, .. } if url == "https://cdn.example/a.png"));
        assert!(err.to_string().contains("panicked"), "{err}");
    }
}
