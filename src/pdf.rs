//! PDF 변환 모듈
//!
//! 이미지 한 장을 기본 크기(A4 세로) 페이지 하나에 비율을 유지하며 가운데 배치합니다.
//! JPEG 원본은 그대로 `DCTDecode` 스트림으로 넣고, 그 외 포맷은 RGB 래스터로 정규화한 뒤
//! `FlateDecode` 스트림으로 넣습니다 (투명도가 있으면 SMask 추가).

use std::io::{Cursor, Write};

use flate2::write::ZlibEncoder;
use flate2::Compression;
use image::codecs::jpeg::JpegDecoder;
use image::{ColorType, ImageDecoder};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};

use crate::codec;
use crate::convert::ConvertOptions;
use crate::error::{ImgConvertError, Result};
use crate::item::SourceFile;

/// 기본 페이지 너비 (pt)
pub const PAGE_WIDTH: f32 = 595.28;

/// 기본 페이지 높이 (pt)
pub const PAGE_HEIGHT: f32 = 841.89;

/// 페이지 리소스에서 이미지를 가리키는 이름
const IMAGE_NAME: &str = "Im0";

/// 페이지 위 이미지 배치 (좌하단 원점, pt)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// 비율을 유지하며 페이지에 맞추고 가운데 정렬
///
/// # Examples
/// ```
/// use imgconvert::pdf::fit_to_page;
///
/// let p = fit_to_page(100, 100, 200.0, 400.0);
/// assert_eq!((p.width, p.height), (200.0, 200.0));
/// assert_eq!((p.x, p.y), (0.0, 100.0));
/// ```
pub fn fit_to_page(width: u32, height: u32, page_width: f32, page_height: f32) -> Placement {
    let (w, h) = (width.max(1) as f32, height.max(1) as f32);
    let scale = (page_width / w).min(page_height / h);
    let (scaled_w, scaled_h) = (w * scale, h * scale);

    Placement {
        x: (page_width - scaled_w) / 2.0,
        y: (page_height - scaled_h) / 2.0,
        width: scaled_w,
        height: scaled_h,
    }
}

/// PDF에 넣을 준비가 된 이미지
#[derive(Debug, Clone)]
pub enum EmbeddedImage {
    /// 원본 JPEG 바이트 그대로
    Jpeg {
        data: Vec<u8>,
        width: u32,
        height: u32,
        color_space: &'static str,
    },
    /// 8비트 RGB 래스터 (+ 선택적 알파)
    Raster {
        width: u32,
        height: u32,
        rgb: Vec<u8>,
        alpha: Option<Vec<u8>>,
    },
}

impl EmbeddedImage {
    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            EmbeddedImage::Jpeg { width, height, .. } | EmbeddedImage::Raster { width, height, .. } => {
                (*width, *height)
            }
        }
    }
}

/// 원본 파일을 PDF 삽입용 이미지로 준비
///
/// JPEG 원본은 그레이/RGB 성분일 때만 직접 삽입하고, 그 외(CMYK 등)는 래스터로 정규화합니다.
pub fn prepare_image(source: &SourceFile, options: &ConvertOptions) -> Result<EmbeddedImage> {
    if source.content_type == "image/jpeg" {
        if let Some(jpeg) = inspect_jpeg(&source.data) {
            return Ok(jpeg);
        }
        tracing::debug!(file = %source.name, "JPEG 직접 삽입 불가, 래스터로 정규화");
    }

    let img = codec::fit_within(codec::decode(source, options.max_edge)?, options.max_edge);
    let (width, height) = (img.width(), img.height());
    let alpha = img
        .color()
        .has_alpha()
        .then(|| img.to_rgba8().pixels().map(|p| p[3]).collect());

    Ok(EmbeddedImage::Raster {
        width,
        height,
        rgb: img.to_rgb8().into_raw(),
        alpha,
    })
}

fn inspect_jpeg(data: &[u8]) -> Option<EmbeddedImage> {
    let decoder = JpegDecoder::new(Cursor::new(data)).ok()?;
    let (width, height) = decoder.dimensions();
    let color_space = match decoder.color_type() {
        ColorType::L8 => "DeviceGray",
        ColorType::Rgb8 => "DeviceRGB",
        _ => return None,
    };

    Some(EmbeddedImage::Jpeg {
        data: data.to_vec(),
        width,
        height,
        color_space,
    })
}

fn deflate(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(data)
        .and_then(|_| encoder.finish())
        .map_err(|e| ImgConvertError::conversion("pdf", e))
}

fn image_stream(image: &EmbeddedImage, doc: &mut Document) -> Result<Stream> {
    let stream = match image {
        EmbeddedImage::Jpeg {
            data,
            width,
            height,
            color_space,
        } => Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => *width as i64,
                "Height" => *height as i64,
                "ColorSpace" => *color_space,
                "BitsPerComponent" => 8_i64,
                "Filter" => "DCTDecode",
            },
            data.clone(),
        ),
        EmbeddedImage::Raster {
            width,
            height,
            rgb,
            alpha,
        } => {
            let mut dict = dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => *width as i64,
                "Height" => *height as i64,
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8_i64,
                "Filter" => "FlateDecode",
            };

            if let Some(alpha) = alpha {
                let mask = Stream::new(
                    dictionary! {
                        "Type" => "XObject",
                        "Subtype" => "Image",
                        "Width" => *width as i64,
                        "Height" => *height as i64,
                        "ColorSpace" => "DeviceGray",
                        "BitsPerComponent" => 8_i64,
                        "Filter" => "FlateDecode",
                    },
                    deflate(alpha)?,
                );
                let mask_id = doc.add_object(mask.with_compression(false));
                dict.set("SMask", mask_id);
            }

            Stream::new(dict, deflate(rgb)?)
        }
    };

    // 이미 압축된 데이터이므로 재압축 금지
    Ok(stream.with_compression(false))
}

/// 이미지 한 장을 담은 한 페이지짜리 PDF 생성
pub fn render_single_page(image: &EmbeddedImage) -> Result<Vec<u8>> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let stream = image_stream(image, &mut doc)?;
    let image_id = doc.add_object(stream);

    let (width, height) = image.dimensions();
    let placement = fit_to_page(width, height, PAGE_WIDTH, PAGE_HEIGHT);

    let content = Content {
        operations: vec![
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![
                    Object::Real(placement.width),
                    Object::Real(0.0),
                    Object::Real(0.0),
                    Object::Real(placement.height),
                    Object::Real(placement.x),
                    Object::Real(placement.y),
                ],
            ),
            Operation::new("Do", vec![Object::Name(IMAGE_NAME.as_bytes().to_vec())]),
            Operation::new("Q", vec![]),
        ],
    };
    let content_bytes = content
        .encode()
        .map_err(|e| ImgConvertError::conversion("pdf", e))?;
    let content_id = doc.add_object(Stream::new(dictionary! {}, content_bytes));

    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "MediaBox" => vec![
            Object::Integer(0),
            Object::Integer(0),
            Object::Real(PAGE_WIDTH),
            Object::Real(PAGE_HEIGHT),
        ],
        "Contents" => content_id,
        "Resources" => dictionary! {
            "XObject" => dictionary! {
                IMAGE_NAME => image_id,
            },
        },
    });

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![Object::Reference(page_id)],
            "Count" => 1_i64,
        }),
    );

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut buf = Vec::new();
    doc.save_to(&mut buf)
        .map_err(|e| ImgConvertError::conversion("pdf", e))?;

    Ok(buf)
}
