//! imgconvert - IMAGE FORMAT CONVERTER
//!
//! 이미지 파일을 다른 포맷으로 일괄 변환하고, 결과를 개별 파일 또는 ZIP 하나로 내보내는 라이브러리 및 CLI 도구입니다.
//!
//! # 구성
//!
//! - 🗂️ **포맷 레지스트리** ([`registry`]): 지원 포맷, MIME 타입, 출력 파일 이름 규칙
//! - 🔄 **변환** ([`convert`]): 파일 하나를 대상 포맷으로 변환 (크기 제한, PDF 삽입 포함)
//! - ⚡ **배치 오케스트레이터** ([`batch`]): 최대 10개 항목의 동시 변환과 상태 관리
//! - 📦 **ZIP 묶음** ([`export`]): 완료된 출력 전체를 하나의 ZIP으로
//! - 📊 **통계/보고서** ([`stats`], [`report`]): 콘솔 요약과 JSON 보고서
//!
//! # 예제
//!
//! ```bash
//! # 단일 파일 변환
//! imgconvert -i photo.png -t webp
//!
//! # 폴더 전체를 JPG로 변환 후 ZIP으로 저장
//! imgconvert -i ./photos -t jpg --zip
//!
//! # 파일별로 다른 포맷 지정
//! imgconvert -i a.png -i b.bmp -t png --target a.png=pdf
//! ```

pub mod batch;
pub mod cli;
pub mod codec;
pub mod convert;
pub mod error;
pub mod export;
pub mod item;
pub mod pattern;
pub mod pdf;
pub mod registry;
pub mod report;
pub mod stats;
pub mod store;

// Re-exports for convenient access
pub use batch::{Admission, BatchEvent, BatchLimits, Orchestrator, RejectReason, RunSummary};
pub use cli::{Args, WriteMode};
pub use convert::{convert, ConvertOptions};
pub use error::{ImgConvertError, Result};
pub use export::Archive;
pub use item::{Blob, Download, ItemId, ItemSnapshot, ItemStatus, SourceFile};
pub use pattern::FileFilter;
pub use registry::Format;
pub use stats::{format_bytes, Statistics};
