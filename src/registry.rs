//! 포맷 레지스트리 모듈
//!
//! 인식 가능한 확장자, MIME 타입, 변환 가능 포맷 표를 정의합니다.
//! 이 표는 입력 필터링과 출력 라벨링 모두의 기준이며, 파일 내용으로 포맷을 추측하지 않습니다.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ImgConvertError, Result};

/// 배치에 담을 수 있는 최대 파일 수
pub const MAX_FILES: usize = 10;

/// 파일 하나의 최대 크기 (10MB)
pub const MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// 레지스트리에 등록된 포맷 토큰
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    Jpg,
    Jpeg,
    Png,
    Webp,
    Gif,
    Bmp,
    Tiff,
    Svg,
    Pdf,
}

/// 입력으로 받을 수 있는 포맷 (순서 유지)
pub const SOURCE_FORMATS: [Format; 8] = [
    Format::Jpg,
    Format::Jpeg,
    Format::Png,
    Format::Webp,
    Format::Gif,
    Format::Bmp,
    Format::Tiff,
    Format::Svg,
];

/// 변환 대상으로 선택할 수 있는 포맷 (순서 유지)
pub const TARGET_FORMATS: [Format; 7] = [
    Format::Jpg,
    Format::Jpeg,
    Format::Png,
    Format::Webp,
    Format::Gif,
    Format::Bmp,
    Format::Pdf,
];

impl Format {
    /// 소문자 토큰으로부터 포맷 조회
    ///
    /// # Examples
    /// ```
    /// use imgconvert::registry::Format;
    ///
    /// assert_eq!(Format::parse("png"), Some(Format::Png));
    /// assert_eq!(Format::parse("heic"), None);
    /// ```
    pub fn parse(token: &str) -> Option<Format> {
        let format = match token {
            "jpg" => Format::Jpg,
            "jpeg" => Format::Jpeg,
            "png" => Format::Png,
            "webp" => Format::Webp,
            "gif" => Format::Gif,
            "bmp" => Format::Bmp,
            "tiff" => Format::Tiff,
            "svg" => Format::Svg,
            "pdf" => Format::Pdf,
            _ => return None,
        };
        Some(format)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Format::Jpg => "jpg",
            Format::Jpeg => "jpeg",
            Format::Png => "png",
            Format::Webp => "webp",
            Format::Gif => "gif",
            Format::Bmp => "bmp",
            Format::Tiff => "tiff",
            Format::Svg => "svg",
            Format::Pdf => "pdf",
        }
    }

    /// 표준 MIME 타입
    pub fn mime_type(&self) -> &'static str {
        match self {
            Format::Jpg | Format::Jpeg => "image/jpeg",
            Format::Png => "image/png",
            Format::Webp => "image/webp",
            Format::Gif => "image/gif",
            Format::Bmp => "image/bmp",
            Format::Tiff => "image/tiff",
            Format::Svg => "image/svg+xml",
            Format::Pdf => "application/pdf",
        }
    }

    pub fn is_source(&self) -> bool {
        SOURCE_FORMATS.contains(self)
    }

    pub fn is_target(&self) -> bool {
        TARGET_FORMATS.contains(self)
    }

    /// 대상 포맷 토큰을 검증하여 반환
    ///
    /// 비어 있거나, 모르는 토큰이거나, 입력 전용 포맷(tiff, svg)이면 `UnsupportedFormat`.
    pub fn target(token: &str) -> Result<Format> {
        Format::parse(token)
            .filter(Format::is_target)
            .ok_or_else(|| ImgConvertError::UnsupportedFormat {
                format: token.to_string(),
            })
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 인식 가능한 이미지 확장자인지 확인
pub fn is_image_extension(ext: &str) -> bool {
    Format::parse(ext).is_some_and(|f| f.is_source())
}

/// 주어진 확장자에서 변환 가능한 포맷 목록
///
/// 자기 자신으로의 변환은 제외되며, 인식할 수 없는 확장자는 빈 목록을 반환합니다.
///
/// # Examples
/// ```
/// use imgconvert::registry::{convertible_formats, Format};
///
/// let formats = convertible_formats("png");
/// assert!(formats.contains(&Format::Webp));
/// assert!(!formats.contains(&Format::Png));
/// assert!(convertible_formats("txt").is_empty());
/// ```
pub fn convertible_formats(ext: &str) -> Vec<Format> {
    if !is_image_extension(ext) {
        return Vec::new();
    }

    TARGET_FORMATS
        .iter()
        .copied()
        .filter(|f| f.as_str() != ext)
        .collect()
}

/// 포맷 토큰의 MIME 타입 조회 (대소문자 무시)
pub fn mime_type(token: &str) -> Result<&'static str> {
    Format::parse(&token.trim().to_lowercase())
        .map(|f| f.mime_type())
        .ok_or_else(|| ImgConvertError::UnsupportedFormat {
            format: token.to_string(),
        })
}

/// 입력 필터용 `.확장자 → [MIME]` 표
pub fn allowed_file_types() -> BTreeMap<String, Vec<&'static str>> {
    SOURCE_FORMATS
        .iter()
        .map(|f| (format!(".{}", f.as_str()), vec![f.mime_type()]))
        .collect()
}

/// 파일 이름이 입력 필터 표에 있는 확장자인지 확인
///
/// # Examples
/// ```
/// use imgconvert::registry::is_allowed_file;
///
/// assert!(is_allowed_file("scan.TIFF"));
/// assert!(!is_allowed_file("report.pdf"));
/// ```
pub fn is_allowed_file(file_name: &str) -> bool {
    let ext = file_extension(file_name);
    !ext.is_empty() && allowed_file_types().contains_key(&format!(".{}", ext))
}

/// 파일 이름에서 확장자 추출 (마지막 `.` 이후, 소문자)
///
/// 점이 없거나 맨 앞에만 있으면 빈 문자열을 반환합니다.
pub fn file_extension(file_name: &str) -> String {
    match file_name.rfind('.') {
        Some(0) | None => String::new(),
        Some(idx) => file_name[idx + 1..].to_lowercase(),
    }
}

/// 출력 파일 이름에 쓰일 원본 이름 부분 (첫 번째 `.` 이전)
pub fn file_stem(file_name: &str) -> &str {
    let stem = file_name.split('.').next().unwrap_or_default();
    if stem.is_empty() {
        "image"
    } else {
        stem
    }
}

/// `<stem>.<target>` 형식의 출력 파일 이름
pub fn output_name(file_name: &str, target: &str) -> String {
    format!("{}.{}", file_stem(file_name), target)
}
