//! 변환 유닛 모듈
//!
//! 파일 하나를 대상 포맷 하나로 변환합니다. 실제 인코딩은 rayon 풀에서 수행하고,
//! 그동안 일정 간격으로 가상의 진행률을 보고합니다.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::codec;
use crate::error::{ImgConvertError, Result};
use crate::item::{Blob, SourceFile};
use crate::pdf;
use crate::registry::Format;

/// 변환 옵션
#[derive(Debug, Clone)]
pub struct ConvertOptions {
    /// 출력 크기 상한 (바이트)
    pub max_output_bytes: u64,
    /// 긴 변의 최대 픽셀 수
    pub max_edge: u32,
    /// JPEG 품질 하한
    pub min_jpeg_quality: u8,
    /// 크기 상한 초과 시 최대 축소 횟수
    pub max_downscale_passes: u32,
    /// 진행률 보고 간격
    pub tick_interval: Duration,
    /// 한 번에 증가하는 진행률
    pub tick_step: u8,
    /// 완료 전 진행률 상한
    pub tick_cap: u8,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            max_output_bytes: 2 * 1024 * 1024, // 2MB
            max_edge: 2048,
            min_jpeg_quality: 50,
            max_downscale_passes: 5,
            tick_interval: Duration::from_millis(200),
            tick_step: 10,
            tick_cap: 90,
        }
    }
}

impl ConvertOptions {
    /// 기본 옵션 생성
    pub fn new() -> Self {
        Self::default()
    }

    /// 출력 크기 상한 설정
    pub fn with_max_output_bytes(mut self, bytes: u64) -> Self {
        self.max_output_bytes = bytes;
        self
    }

    /// 긴 변 상한 설정
    pub fn with_max_edge(mut self, max_edge: u32) -> Self {
        self.max_edge = max_edge.max(1);
        self
    }

    /// 진행률 보고 간격 설정
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }
}

/// 단일 파일 변환
///
/// # Arguments
/// * `source` - 원본 파일
/// * `target_format` - 대상 포맷 토큰 (예: "webp", "pdf")
/// * `options` - 변환 옵션
/// * `on_progress` - 진행률 콜백 (0~100)
///
/// # Returns
/// 변환된 바이너리. 실패 시 `InvalidInput`, `UnsupportedFormat`, `ConversionFailed` 중 하나.
///
/// 진행률은 종료 전까지 단조 증가하며 `tick_cap`을 넘지 않습니다.
/// 타이머는 결과보다 먼저 멈추고, 마지막 보고값은 성공 시 100, 실패 시 0입니다.
pub async fn convert<F>(
    source: &SourceFile,
    target_format: &str,
    options: &ConvertOptions,
    mut on_progress: F,
) -> Result<Blob>
where
    F: FnMut(u8),
{
    let work = async {
        let target = validate(source, target_format)?;
        encode_on_pool(source.clone(), target, options.clone()).await
    };
    tokio::pin!(work);

    let period = options.tick_interval.max(Duration::from_millis(1));
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut progress = 0u8;
    let result = loop {
        tokio::select! {
            biased;
            result = &mut work => break result,
            _ = ticker.tick() => {
                let next = progress.saturating_add(options.tick_step).min(options.tick_cap);
                if next > progress {
                    progress = next;
                    on_progress(progress);
                }
            }
        }
    };

    match &result {
        Ok(blob) => {
            tracing::debug!(file = %source.name, format = target_format, bytes = blob.len(), "변환 성공");
            on_progress(100);
        }
        Err(e) => {
            tracing::debug!(file = %source.name, format = target_format, error = %e, "변환 실패");
            on_progress(0);
        }
    }

    result
}

/// 입력과 대상 포맷 검증
fn validate(source: &SourceFile, target_format: &str) -> Result<Format> {
    if source.data.is_empty() {
        return Err(ImgConvertError::InvalidInput {
            reason: format!("{} 파일이 비어 있습니다", source.name),
        });
    }
    if source.content_type.is_empty() {
        return Err(ImgConvertError::InvalidInput {
            reason: format!("{} 파일의 형식을 알 수 없습니다", source.name),
        });
    }

    Format::target(target_format)
}

/// CPU 바운드 인코딩을 rayon 풀에 맡기고 결과를 기다림
async fn encode_on_pool(source: SourceFile, target: Format, options: ConvertOptions) -> Result<Blob> {
    let (tx, rx) = oneshot::channel();

    rayon::spawn(move || {
        let result = catch_unwind(AssertUnwindSafe(|| encode_blocking(&source, target, &options)))
            .unwrap_or_else(|_| {
                Err(ImgConvertError::conversion("worker", "인코딩 작업 중 패닉이 발생했습니다"))
            });
        let _ = tx.send(result);
    });

    rx.await
        .map_err(|_| ImgConvertError::conversion("worker", "인코딩 작업이 중단되었습니다"))?
}

/// 동기 변환 본체
pub fn encode_blocking(source: &SourceFile, target: Format, options: &ConvertOptions) -> Result<Blob> {
    let data = match target {
        Format::Pdf => {
            let image = pdf::prepare_image(source, options)?;
            pdf::render_single_page(&image)?
        }
        _ => {
            let img = codec::decode(source, options.max_edge)?;
            codec::encode_within_limit(img, target, options)?
        }
    };

    Ok(Blob::new(data, target.mime_type()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, Rgb, RgbImage};

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([10, 200, 30])));
        codec::encode(&img, Format::Png, 100).unwrap()
    }

    fn fast_options() -> ConvertOptions {
        ConvertOptions::new().with_tick_interval(Duration::from_millis(5))
    }

    #[test]
    fn test_convert_options_builder() {
        let options = ConvertOptions::new()
            .with_max_output_bytes(1024)
            .with_max_edge(0)
            .with_tick_interval(Duration::from_millis(50));

        assert_eq!(options.max_output_bytes, 1024);
        assert_eq!(options.max_edge, 1);
        assert_eq!(options.tick_interval, Duration::from_millis(50));
        assert_eq!(options.tick_cap, 90);
    }

    #[tokio::test]
    async fn test_convert_png_to_webp() {
        let source = SourceFile::new("photo.png", png_bytes(32, 16));
        let mut reports = Vec::new();

        let blob = convert(&source, "webp", &fast_options(), |p| reports.push(p))
            .await
            .unwrap();

        assert_eq!(blob.content_type, "image/webp");
        let decoded = image::load_from_memory(&blob.data).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (32, 16));
        assert_eq!(reports.last(), Some(&100));
    }

    #[tokio::test]
    async fn test_convert_empty_input() {
        let source = SourceFile::new("empty.png", Vec::<u8>::new());
        let mut reports = Vec::new();

        let err = convert(&source, "jpg", &fast_options(), |p| reports.push(p))
            .await
            .unwrap_err();

        assert!(matches!(err, ImgConvertError::InvalidInput { .. }));
        assert_eq!(reports, vec![0]);
    }

    #[tokio::test]
    async fn test_convert_unsupported_target() {
        let source = SourceFile::new("photo.png", png_bytes(4, 4));

        for target in ["", "heic", "tiff", "svg"] {
            let err = convert(&source, target, &fast_options(), |_| {})
                .await
                .unwrap_err();
            assert!(
                matches!(err, ImgConvertError::UnsupportedFormat { .. }),
                "{target}"
            );
        }
    }

    #[tokio::test]
    async fn test_convert_corrupt_source() {
        let source = SourceFile::new("broken.gif", vec![7u8; 64]);
        let err = convert(&source, "png", &fast_options(), |_| {})
            .await
            .unwrap_err();
        assert!(matches!(err, ImgConvertError::ConversionFailed { .. }));
    }

    #[tokio::test]
    async fn test_progress_is_monotonic_and_capped() {
        let source = SourceFile::new("photo.png", png_bytes(512, 512));
        let options = ConvertOptions::new().with_tick_interval(Duration::from_millis(1));
        let mut reports = Vec::new();

        convert(&source, "gif", &options, |p| reports.push(p))
            .await
            .unwrap();

        let (terminal, ticking) = reports.split_last().unwrap();
        assert_eq!(*terminal, 100);
        assert!(ticking.windows(2).all(|w| w[0] < w[1]));
        assert!(ticking.iter().all(|p| *p <= 90 && p % 10 == 0));
    }

    #[test]
    fn test_encode_blocking_pdf_mime() {
        let source = SourceFile::new("photo.png", png_bytes(10, 20));
        let blob = encode_blocking(&source, Format::Pdf, &ConvertOptions::new()).unwrap();
        assert_eq!(blob.content_type, "application/pdf");
        assert!(blob.data.starts_with(b"%PDF"));
    }
}
