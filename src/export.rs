//! ZIP 묶음 모듈
//!
//! 완료된 항목의 출력을 모두 모아 ZIP 파일 하나로 만듭니다.
//! 변환과 달리 전부 아니면 전무: 출력 하나라도 가져오지 못하면 묶음 전체가 실패합니다.

use std::collections::HashSet;
use std::io::{Cursor, Write};

use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::{ImgConvertError, Result};
use crate::item::{Blob, ConversionItem, ItemStatus};
use crate::registry;
use crate::store::OutputStore;

/// 묶음 파일 이름
pub const ARCHIVE_NAME: &str = "converted-files.zip";

/// 묶음 파일 MIME 타입
pub const ARCHIVE_CONTENT_TYPE: &str = "application/zip";

/// 생성된 ZIP 묶음
#[derive(Debug, Clone)]
pub struct Archive {
    pub file_name: String,
    pub blob: Blob,
    /// 묶음에 들어간 파일 이름 (순서대로)
    pub entries: Vec<String>,
}

/// 완료된 항목을 ZIP으로 묶음
///
/// 완료 항목이 없으면 빈 ZIP을 반환합니다.
pub(crate) fn export_all(items: &[ConversionItem], store: &OutputStore) -> Result<Archive> {
    let finished = items
        .iter()
        .filter(|item| item.status == ItemStatus::Finished);

    // 먼저 모든 출력을 확보한 뒤에 ZIP을 씀
    let mut payloads = Vec::new();
    for item in finished {
        let blob = item
            .output
            .as_ref()
            .and_then(|output| store.fetch(&output.handle))
            .ok_or_else(|| ImgConvertError::Bundling {
                reason: format!("출력을 가져올 수 없습니다: {}", item.source.name),
            })?;
        payloads.push((
            registry::output_name(&item.source.name, &item.target_format),
            blob,
        ));
    }

    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut used = HashSet::new();
    let mut entries = Vec::with_capacity(payloads.len());

    for (name, blob) in payloads {
        let name = unique_name(&name, &mut used);
        writer.start_file(name.as_str(), options).map_err(bundling)?;
        writer.write_all(&blob.data).map_err(bundling)?;
        entries.push(name);
    }

    let bytes = writer.finish().map_err(bundling)?.into_inner();
    tracing::info!(entries = entries.len(), bytes = bytes.len(), "ZIP 묶음 생성");

    Ok(Archive {
        file_name: ARCHIVE_NAME.to_string(),
        blob: Blob::new(bytes, ARCHIVE_CONTENT_TYPE),
        entries,
    })
}

fn bundling(e: impl std::fmt::Display) -> ImgConvertError {
    ImgConvertError::Bundling {
        reason: e.to_string(),
    }
}

/// 같은 이름이 이미 있으면 `stem-1.ext`, `stem-2.ext` 형식으로 바꿈
pub fn unique_name(name: &str, used: &mut HashSet<String>) -> String {
    if used.insert(name.to_string()) {
        return name.to_string();
    }

    let (stem, ext) = name.rsplit_once('.').unwrap_or((name, ""));
    let mut n = 1;
    loop {
        let candidate = if ext.is_empty() {
            format!("{stem}-{n}")
        } else {
            format!("{stem}-{n}.{ext}")
        };
        if used.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}
