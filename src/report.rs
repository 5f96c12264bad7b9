//! 결과 보고서 모듈
//!
//! 배치 실행 결과를 JSON 파일로 기록합니다.

use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::SystemTime;

use crate::batch::{Rejected, RunSummary};
use crate::error::{ImgConvertError, Result};
use crate::item::ItemSnapshot;

/// 배치 결과 보고서
#[derive(Debug, Serialize)]
pub struct BatchReport {
    /// 생성 시각 (Unix 초)
    pub generated_at_unix: u64,
    pub summary: RunSummary,
    /// 처리 시간 (밀리초)
    pub elapsed_ms: u128,
    /// 모든 항목의 최종 상태 (등록 순서)
    pub items: Vec<ItemSnapshot>,
    /// 입력 단계에서 거부된 파일
    pub rejected: Vec<Rejected>,
}

impl BatchReport {
    pub fn new(summary: RunSummary, items: Vec<ItemSnapshot>, rejected: Vec<Rejected>) -> Self {
        let generated_at_unix = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();

        Self {
            generated_at_unix,
            elapsed_ms: summary.elapsed.as_millis(),
            summary,
            items,
            rejected,
        }
    }
}

/// 보고서를 들여쓰기된 JSON으로 저장
pub fn write_report(path: &Path, report: &BatchReport) -> Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);

    serde_json::to_writer_pretty(&mut writer, report).map_err(|e| ImgConvertError::WriteError {
        reason: e.to_string(),
    })?;
    writeln!(writer)?;
    writer.flush()?;

    Ok(())
}
