//! 에러 타입 정의 모듈
//!
//! imgconvert에서 발생할 수 있는 모든 에러 타입을 정의합니다.
//!
//! 항목 단위 에러(`InvalidInput`, `UnsupportedFormat`, `ConversionFailed`)는
//! 해당 항목의 `error` 상태로만 기록되고 다른 항목이나 배치 실행에는 전파되지 않습니다.

use std::path::PathBuf;
use thiserror::Error;

use crate::item::{ItemId, ItemStatus};

/// imgconvert에서 발생할 수 있는 에러 타입
#[derive(Error, Debug)]
pub enum ImgConvertError {
    /// 비어 있거나 잘못된 원본 데이터
    #[error("잘못된 입력 파일입니다: {reason}")]
    InvalidInput { reason: String },

    /// 레지스트리에 없는 대상 포맷
    #[error("지원하지 않는 대상 포맷입니다: {format}")]
    UnsupportedFormat { format: String },

    /// 디코딩/인코딩/PDF 삽입 실패 (원인 메시지 포함)
    #[error("변환 실패 ({stage}): {reason}")]
    ConversionFailed { stage: &'static str, reason: String },

    /// ZIP 묶음 생성 실패 (배치 상태는 변경되지 않음)
    #[error("ZIP 파일 생성 실패: {reason}")]
    Bundling { reason: String },

    /// 이미 배치 변환이 진행 중
    #[error("이미 변환이 진행 중입니다")]
    RunInProgress,

    /// 존재하지 않는 항목
    #[error("항목을 찾을 수 없습니다: {id}")]
    ItemNotFound { id: ItemId },

    /// 대기 상태가 아닌 항목의 대상 포맷 변경 시도
    #[error("대기 중인 항목만 변경할 수 있습니다 ({id}: {status})")]
    NotWaiting { id: ItemId, status: ItemStatus },

    /// 변환이 완료되지 않은 항목의 다운로드 시도
    #[error("변환이 완료되지 않은 항목입니다: {id}")]
    NotFinished { id: ItemId },

    /// 입력 경로가 존재하지 않음
    #[error("입력 경로를 찾을 수 없습니다: {path}")]
    InputNotFound { path: PathBuf },

    /// 출력 파일이 이미 존재 (Error 모드에서)
    #[error("출력 파일이 이미 존재합니다: {path}")]
    OutputExists { path: PathBuf },

    /// 파일 쓰기 실패
    #[error("파일 쓰기 실패: {reason}")]
    WriteError { reason: String },

    /// 스레드 풀 초기화 실패
    #[error("스레드 풀 초기화 실패: {reason}")]
    ThreadPoolError { reason: String },

    /// 유효하지 않은 패턴
    #[error("유효하지 않은 패턴: {pattern}")]
    InvalidPattern { pattern: String },

    /// 유효하지 않은 `이름=포맷` 지정
    #[error("유효하지 않은 대상 지정: {value}")]
    InvalidTarget { value: String },

    /// 처리할 파일 없음
    #[error("처리할 이미지 파일이 없습니다")]
    NoFilesFound,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ImgConvertError {
    /// 변환 단계 이름과 원인으로 `ConversionFailed` 생성
    pub fn conversion(stage: &'static str, cause: impl std::fmt::Display) -> Self {
        ImgConvertError::ConversionFailed {
            stage,
            reason: cause.to_string(),
        }
    }

    /// 항목 단위로 격리되는 에러인지 여부
    pub fn is_item_error(&self) -> bool {
        matches!(
            self,
            ImgConvertError::InvalidInput { .. }
                | ImgConvertError::UnsupportedFormat { .. }
                | ImgConvertError::ConversionFailed { .. }
        )
    }
}

/// imgconvert 결과 타입 별칭
pub type Result<T> = std::result::Result<T, ImgConvertError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversion_error_keeps_cause() {
        let err = ImgConvertError::conversion("encode", "buffer too small");
        let msg = err.to_string();
        assert!(msg.contains("encode"));
        assert!(msg.contains("buffer too small"));
        assert!(err.is_item_error());
    }

    #[test]
    fn test_batch_errors_are_not_item_errors() {
        assert!(!ImgConvertError::RunInProgress.is_item_error());
        assert!(!ImgConvertError::Bundling {
            reason: "x".to_string()
        }
        .is_item_error());
    }
}
