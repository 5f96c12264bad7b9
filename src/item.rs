//! 변환 항목 모델
//!
//! 사용자가 제출한 파일 하나가 변환 파이프라인을 통과하는 동안의 상태를 표현합니다.

use std::fmt;

use bytes::Bytes;
use serde::Serialize;
use uuid::Uuid;

use crate::registry;
use crate::store::OutputHandle;

/// 항목 식별자 (등록 시 발급, 수명 동안 불변)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ItemId(Uuid);

impl ItemId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ItemId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 항목 상태
///
/// `Waiting → Converting → {Finished, Error}` 방향으로만 전이합니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Waiting,
    Converting,
    Finished,
    Error,
}

impl ItemStatus {
    /// 종료 상태 여부
    pub fn is_terminal(&self) -> bool {
        matches!(self, ItemStatus::Finished | ItemStatus::Error)
    }

    /// 허용되는 전이인지 확인
    pub fn can_transition_to(&self, next: ItemStatus) -> bool {
        matches!(
            (self, next),
            (ItemStatus::Waiting, ItemStatus::Converting)
                | (ItemStatus::Converting, ItemStatus::Converting)
                | (ItemStatus::Converting, ItemStatus::Finished)
                | (ItemStatus::Converting, ItemStatus::Error)
        )
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemStatus::Waiting => write!(f, "waiting"),
            ItemStatus::Converting => write!(f, "converting"),
            ItemStatus::Finished => write!(f, "finished"),
            ItemStatus::Error => write!(f, "error"),
        }
    }
}

/// 사용자가 제출한 원본 파일
#[derive(Debug, Clone)]
pub struct SourceFile {
    /// 선언된 파일 이름
    pub name: String,
    /// 확장자에서 유도한 MIME 타입 (모르는 확장자면 빈 문자열)
    pub content_type: String,
    /// 원본 바이트 (불변)
    pub data: Bytes,
}

impl SourceFile {
    /// 이름과 데이터로 원본 파일 생성 (MIME 타입은 레지스트리에서 조회)
    pub fn new(name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        let name = name.into();
        let content_type = registry::mime_type(&registry::file_extension(&name))
            .unwrap_or_default()
            .to_string();

        Self {
            name,
            content_type,
            data: data.into(),
        }
    }

    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn extension(&self) -> String {
        registry::file_extension(&self.name)
    }
}

/// 완료된 항목이 소유하는 출력
#[derive(Debug, Clone)]
pub(crate) struct ItemOutput {
    pub(crate) handle: OutputHandle,
    pub(crate) content_type: &'static str,
    pub(crate) size: u64,
}

/// 오케스트레이터가 보관하는 항목 레코드
#[derive(Debug, Clone)]
pub(crate) struct ConversionItem {
    pub(crate) id: ItemId,
    pub(crate) source: SourceFile,
    pub(crate) source_extension: String,
    pub(crate) target_format: String,
    pub(crate) status: ItemStatus,
    pub(crate) progress: u8,
    pub(crate) output: Option<ItemOutput>,
    pub(crate) error_message: Option<String>,
}

impl ConversionItem {
    pub(crate) fn new(source: SourceFile) -> Self {
        let source_extension = source.extension();
        Self {
            id: ItemId::new(),
            source,
            source_extension,
            target_format: String::new(),
            status: ItemStatus::Waiting,
            progress: 0,
            output: None,
            error_message: None,
        }
    }

    /// 대상 포맷이 지정된 대기 항목인지 (변환 대상 여부)
    pub(crate) fn is_eligible(&self) -> bool {
        self.status == ItemStatus::Waiting && !self.target_format.is_empty()
    }

    pub(crate) fn snapshot(&self) -> ItemSnapshot {
        ItemSnapshot {
            id: self.id,
            name: self.source.name.clone(),
            size: self.source.size(),
            source_extension: self.source_extension.clone(),
            target_format: self.target_format.clone(),
            status: self.status,
            progress: self.progress,
            output_name: self
                .output
                .as_ref()
                .map(|_| registry::output_name(&self.source.name, &self.target_format)),
            output_type: self.output.as_ref().map(|o| o.content_type),
            output_size: self.output.as_ref().map(|o| o.size),
            error_message: self.error_message.clone(),
        }
    }
}

/// 외부에 공개되는 항목 상태의 불변 스냅샷
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemSnapshot {
    pub id: ItemId,
    pub name: String,
    pub size: u64,
    pub source_extension: String,
    pub target_format: String,
    pub status: ItemStatus,
    pub progress: u8,
    /// 완료 시 다운로드 파일 이름
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_type: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl ItemSnapshot {
    /// 현재 원본 확장자에서 선택 가능한 대상 포맷
    pub fn convertible_formats(&self) -> Vec<registry::Format> {
        registry::convertible_formats(&self.source_extension)
    }
}

/// 변환 결과 바이너리와 MIME 타입
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    pub data: Bytes,
    pub content_type: &'static str,
}

impl Blob {
    pub fn new(data: impl Into<Bytes>, content_type: &'static str) -> Self {
        Self {
            data: data.into(),
            content_type,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// 단일 항목 다운로드 (묶음 없이 원본 출력 그대로)
#[derive(Debug, Clone)]
pub struct Download {
    pub file_name: String,
    pub blob: Blob,
}
