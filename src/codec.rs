//! 래스터 코덱 모듈
//!
//! 원본 디코딩, 크기 축소 패스, 대상 포맷 인코딩을 담당합니다.
//! 모든 함수는 동기 함수이며 rayon 풀에서 실행됩니다.

use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, RgbaImage};
use resvg::{tiny_skia, usvg};

use crate::convert::ConvertOptions;
use crate::error::{ImgConvertError, Result};
use crate::item::SourceFile;
use crate::registry::Format;

/// 한 번의 축소 패스에서 적용하는 배율
const DOWNSCALE_FACTOR: f32 = 0.8;

/// JPEG 품질 단계 간격
const JPEG_QUALITY_STEP: u8 = 10;

/// 원본 파일을 래스터 이미지로 디코딩
///
/// 선언된 확장자의 디코더를 먼저 시도하고, 실패하면 내용 기반 추정으로 한 번 더 시도합니다.
/// SVG는 긴 변이 `max_edge` 이하가 되는 크기로 바로 래스터화합니다.
pub fn decode(source: &SourceFile, max_edge: u32) -> Result<DynamicImage> {
    let ext = source.extension();
    if ext == Format::Svg.as_str() {
        return rasterize_svg(&source.data, max_edge);
    }

    let declared = ImageFormat::from_extension(&ext);
    let first_attempt = match declared {
        Some(format) => image::load_from_memory_with_format(&source.data, format),
        None => image::load_from_memory(&source.data),
    };

    match first_attempt {
        Ok(img) => Ok(img),
        Err(e) if declared.is_some() => {
            tracing::debug!(file = %source.name, error = %e, "선언된 포맷으로 디코딩 실패, 추정 재시도");
            image::load_from_memory(&source.data).map_err(|_| ImgConvertError::conversion("decode", e))
        }
        Err(e) => Err(ImgConvertError::conversion("decode", e)),
    }
}

/// SVG 문서를 RGBA 이미지로 래스터화
///
/// 선언된 크기가 `max_edge`를 넘으면 축소된 캔버스에 그립니다.
/// 캔버스는 선언 크기와 무관하게 `max_edge` × `max_edge` 이하입니다.
fn rasterize_svg(data: &[u8], max_edge: u32) -> Result<DynamicImage> {
    let tree = usvg::Tree::from_data(data, &usvg::Options::default())
        .map_err(|e| ImgConvertError::conversion("svg", e))?;

    let size = tree.size();
    let (scale, width, height) = svg_canvas(size.width(), size.height(), max_edge);
    let mut pixmap = tiny_skia::Pixmap::new(width, height)
        .ok_or_else(|| ImgConvertError::conversion("svg", "캔버스를 만들 수 없습니다"))?;
    resvg::render(
        &tree,
        tiny_skia::Transform::from_scale(scale, scale),
        &mut pixmap.as_mut(),
    );

    // tiny-skia 픽셀은 premultiplied alpha
    let rgba: Vec<u8> = pixmap
        .pixels()
        .iter()
        .flat_map(|p| {
            let c = p.demultiply();
            [c.red(), c.green(), c.blue(), c.alpha()]
        })
        .collect();

    RgbaImage::from_raw(width, height, rgba)
        .map(DynamicImage::ImageRgba8)
        .ok_or_else(|| ImgConvertError::conversion("svg", "픽셀 버퍼 크기가 맞지 않습니다"))
}

/// SVG 캔버스 배율과 정수 크기 (`scale = min(1, max_edge / 긴 변)`)
fn svg_canvas(width: f32, height: f32, max_edge: u32) -> (f32, u32, u32) {
    let longest = width.max(height).max(1.0);
    let scale = (max_edge.max(1) as f32 / longest).min(1.0);
    let to_px = |v: f32| ((v * scale).round() as u32).clamp(1, max_edge.max(1));
    (scale, to_px(width), to_px(height))
}

/// 긴 변이 `max_edge` 이하가 되도록 비율을 유지하며 축소
pub fn fit_within(img: DynamicImage, max_edge: u32) -> DynamicImage {
    if img.width().max(img.height()) <= max_edge {
        img
    } else {
        img.resize(max_edge, max_edge, FilterType::Lanczos3)
    }
}

/// 크기 제한을 적용하여 대상 포맷으로 인코딩
///
/// 1. 긴 변을 `max_edge`로 제한
/// 2. JPEG는 품질을 100부터 10씩 낮춤 (하한 `min_jpeg_quality`)
/// 3. 여전히 `max_output_bytes`를 넘으면 0.8배씩 축소 (최대 `max_downscale_passes`회)
///
/// 횟수 제한에 도달하면 마지막 결과를 그대로 반환합니다.
pub fn encode_within_limit(
    img: DynamicImage,
    target: Format,
    options: &ConvertOptions,
) -> Result<Vec<u8>> {
    let mut current = fit_within(img, options.max_edge);
    let mut passes = 0;

    loop {
        let encoded = encode_with_quality_steps(&current, target, options)?;

        let small_enough = encoded.len() as u64 <= options.max_output_bytes;
        let tiny = current.width() <= 1 && current.height() <= 1;
        if small_enough || tiny || passes >= options.max_downscale_passes {
            tracing::debug!(
                format = %target,
                width = current.width(),
                height = current.height(),
                bytes = encoded.len(),
                passes,
                "인코딩 완료"
            );
            return Ok(encoded);
        }

        let width = ((current.width() as f32) * DOWNSCALE_FACTOR).max(1.0) as u32;
        let height = ((current.height() as f32) * DOWNSCALE_FACTOR).max(1.0) as u32;
        current = current.resize(width, height, FilterType::Lanczos3);
        passes += 1;
    }
}

fn encode_with_quality_steps(
    img: &DynamicImage,
    target: Format,
    options: &ConvertOptions,
) -> Result<Vec<u8>> {
    if !matches!(target, Format::Jpg | Format::Jpeg) {
        return encode(img, target, 100);
    }

    let mut quality = 100u8;
    loop {
        let encoded = encode(img, target, quality)?;
        if encoded.len() as u64 <= options.max_output_bytes
            || quality <= options.min_jpeg_quality
        {
            return Ok(encoded);
        }
        quality = quality
            .saturating_sub(JPEG_QUALITY_STEP)
            .max(options.min_jpeg_quality);
    }
}

/// 래스터 이미지를 대상 포맷 바이트로 인코딩
///
/// `quality`는 JPEG에만 적용됩니다.
pub fn encode(img: &DynamicImage, target: Format, quality: u8) -> Result<Vec<u8>> {
    let mut buf = Cursor::new(Vec::new());

    match target {
        Format::Jpg | Format::Jpeg => {
            // JPEG는 알파 채널을 지원하지 않음
            let rgb = img.to_rgb8();
            JpegEncoder::new_with_quality(&mut buf, quality)
                .encode_image(&rgb)
                .map_err(|e| ImgConvertError::conversion("encode", e))?;
        }
        Format::Png => {
            img.write_to(&mut buf, ImageFormat::Png)
                .map_err(|e| ImgConvertError::conversion("encode", e))?;
        }
        Format::Webp | Format::Gif | Format::Bmp => {
            let image_format = match target {
                Format::Webp => ImageFormat::WebP,
                Format::Gif => ImageFormat::Gif,
                _ => ImageFormat::Bmp,
            };
            DynamicImage::ImageRgba8(img.to_rgba8())
                .write_to(&mut buf, image_format)
                .map_err(|e| ImgConvertError::conversion("encode", e))?;
        }
        Format::Tiff | Format::Svg | Format::Pdf => {
            return Err(ImgConvertError::UnsupportedFormat {
                format: target.to_string(),
            });
        }
    }

    Ok(buf.into_inner())
}
