//! 입력 파일 필터 모듈
//!
//! 레지스트리의 이미지 확장자 표와 선택적 glob 패턴으로 입력 파일을 거릅니다.

use std::path::Path;

use glob::Pattern;

use crate::error::{ImgConvertError, Result};
use crate::registry;

/// 입력 파일 필터
#[derive(Default)]
pub struct FileFilter {
    pattern: Option<Pattern>,
}

impl FileFilter {
    /// 새 필터 생성
    ///
    /// # Arguments
    /// * `pattern` - 파일 이름 glob 패턴 (None이면 이미지 확장자만 검사)
    ///
    /// # Examples
    /// ```
    /// use imgconvert::pattern::FileFilter;
    ///
    /// let filter = FileFilter::new(Some("IMG_*".to_string())).unwrap();
    /// assert!(filter.matches_name("IMG_0001.jpg"));
    /// assert!(!filter.matches_name("IMG_0001.txt"));
    /// assert!(!filter.matches_name("scan.png"));
    /// ```
    pub fn new(pattern: Option<String>) -> Result<Self> {
        let compiled = match pattern {
            Some(ref p) => Some(
                Pattern::new(p)
                    .map_err(|_| ImgConvertError::InvalidPattern { pattern: p.clone() })?,
            ),
            None => None,
        };

        Ok(Self { pattern: compiled })
    }

    /// 파일 이름이 이미지 확장자이고 패턴과 일치하는지 확인
    pub fn matches_name(&self, file_name: &str) -> bool {
        if !registry::is_allowed_file(file_name) {
            return false;
        }

        match &self.pattern {
            Some(p) => p.matches(file_name),
            None => true,
        }
    }

    /// 경로의 파일 이름 기준으로 확인
    pub fn accepts(&self, path: &Path) -> bool {
        path.file_name()
            .and_then(|s| s.to_str())
            .map(|name| self.matches_name(name))
            .unwrap_or(false)
    }

    /// 패턴이 설정되어 있는지 확인
    pub fn has_pattern(&self) -> bool {
        self.pattern.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_without_pattern_checks_extension() {
        let filter = FileFilter::new(None).unwrap();
        assert!(filter.matches_name("photo.png"));
        assert!(filter.matches_name("PHOTO.JPEG"));
        assert!(filter.matches_name("vector.svg"));
        assert!(!filter.matches_name("document.pdf"));
        assert!(!filter.matches_name("README"));
        assert!(!filter.has_pattern());
    }

    #[test]
    fn test_filter_with_wildcard() {
        let filter = FileFilter::new(Some("*_thumb.*".to_string())).unwrap();
        assert!(filter.matches_name("cat_thumb.webp"));
        assert!(!filter.matches_name("cat.webp"));
        assert!(filter.has_pattern());
    }

    #[test]
    fn test_filter_with_brackets() {
        let filter = FileFilter::new(Some("img[0-9].*".to_string())).unwrap();
        assert!(filter.matches_name("img1.gif"));
        assert!(!filter.matches_name("imgA.gif"));
    }

    #[test]
    fn test_filter_accepts_path() {
        let filter = FileFilter::new(None).unwrap();
        assert!(filter.accepts(Path::new("/tmp/photos/a.bmp")));
        assert!(!filter.accepts(Path::new("/tmp/photos/")));
    }

    #[test]
    fn test_filter_invalid_pattern() {
        assert!(FileFilter::new(Some("[invalid".to_string())).is_err());
    }
}
