//! 배치 오케스트레이터 모듈
//!
//! 등록된 항목 목록을 보관하고, 대상 포맷이 지정된 대기 항목을 동시에 변환합니다.
//!
//! 항목 레코드는 `apply`를 통해서만 교체됩니다. 변환 작업은 자기 항목의 상태를
//! 직접 바꾸지 않고 채널로 [`ItemUpdate`]를 보내며, 오케스트레이터가 이를 받아
//! 레코드를 통째로 바꾼 뒤 스냅샷을 구독자에게 방송합니다.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::{broadcast, mpsc};

use crate::convert::{self, ConvertOptions};
use crate::error::{ImgConvertError, Result};
use crate::export::{self, Archive};
use crate::item::{
    Blob, ConversionItem, Download, ItemId, ItemOutput, ItemSnapshot, ItemStatus, SourceFile,
};
use crate::registry::{self, Format, MAX_FILES, MAX_FILE_SIZE};
use crate::store::OutputStore;

/// 이벤트 채널 버퍼 크기
const EVENT_CAPACITY: usize = 256;

/// 입력 제한
#[derive(Debug, Clone)]
pub struct BatchLimits {
    /// 배치 최대 항목 수
    pub max_files: usize,
    /// 파일 하나의 최대 크기
    pub max_file_size: u64,
}

impl Default for BatchLimits {
    fn default() -> Self {
        Self {
            max_files: MAX_FILES,
            max_file_size: MAX_FILE_SIZE,
        }
    }
}

impl BatchLimits {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_files(mut self, max_files: usize) -> Self {
        self.max_files = max_files;
        self
    }

    pub fn with_max_file_size(mut self, bytes: u64) -> Self {
        self.max_file_size = bytes;
        self
    }

    /// 크기/확장자 기준 입력 검사 (개수 제한은 제외)
    pub fn check(&self, name: &str, size: u64) -> std::result::Result<(), RejectReason> {
        if size > self.max_file_size {
            return Err(RejectReason::TooLarge {
                size,
                limit: self.max_file_size,
            });
        }
        if !registry::is_allowed_file(name) {
            return Err(RejectReason::UnrecognizedExtension);
        }
        Ok(())
    }
}

/// 입력 거부 사유
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "reason")]
pub enum RejectReason {
    /// 파일 크기 초과
    TooLarge { size: u64, limit: u64 },
    /// 인식할 수 없는 확장자
    UnrecognizedExtension,
    /// 배치 정원 초과
    BatchFull,
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectReason::TooLarge { size, limit } => write!(
                f,
                "크기 초과 ({} > {})",
                crate::stats::format_bytes(*size),
                crate::stats::format_bytes(*limit)
            ),
            RejectReason::UnrecognizedExtension => write!(f, "지원하지 않는 파일 형식"),
            RejectReason::BatchFull => write!(f, "최대 파일 수 초과"),
        }
    }
}

/// 거부된 파일
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rejected {
    pub name: String,
    #[serde(flatten)]
    pub reason: RejectReason,
}

/// `enqueue` 결과
#[derive(Debug, Clone, Default)]
pub struct Admission {
    /// 등록된 항목 ID (입력 순서)
    pub accepted: Vec<ItemId>,
    pub rejected: Vec<Rejected>,
}

/// `run_all` 결과 요약
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// 변환을 시작한 항목 수
    pub launched: usize,
    pub finished: usize,
    pub failed: usize,
    /// 결과가 도착하기 전에 제거된 항목 수
    pub discarded: usize,
    #[serde(skip)]
    pub elapsed: Duration,
}

/// 구독자에게 방송되는 배치 이벤트
#[derive(Debug, Clone)]
pub enum BatchEvent {
    Added(ItemSnapshot),
    Updated(ItemSnapshot),
    Removed(ItemId),
    Cleared,
    RunStarted { launched: usize },
    RunFinished(RunSummary),
}

/// 변환 작업이 오케스트레이터로 보내는 메시지
#[derive(Debug)]
enum ItemUpdate {
    Progress { id: ItemId, progress: u8 },
    Finished { id: ItemId, blob: Blob },
    Failed { id: ItemId, message: String },
}

impl ItemUpdate {
    fn id(&self) -> ItemId {
        match self {
            ItemUpdate::Progress { id, .. }
            | ItemUpdate::Finished { id, .. }
            | ItemUpdate::Failed { id, .. } => *id,
        }
    }
}

/// `apply` 결과
#[derive(Debug, PartialEq, Eq)]
enum Applied {
    Updated(ItemStatus),
    Ignored,
    Discarded,
}

#[derive(Debug, Default)]
struct BatchState {
    items: HashMap<ItemId, ConversionItem>,
    /// 표시용 삽입 순서
    order: Vec<ItemId>,
}

impl BatchState {
    fn ordered(&self) -> impl Iterator<Item = &ConversionItem> {
        self.order.iter().filter_map(|id| self.items.get(id))
    }
}

/// `run_all` 실행 중 표시 (drop 시 해제)
struct RunGuard<'a>(&'a AtomicBool);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// 배치 오케스트레이터
///
/// 여러 작업에서 공유하려면 `Arc`로 감싸서 사용합니다.
/// `run_all` 진행 중에도 `remove`, `set_target`, `items` 호출은 안전합니다.
pub struct Orchestrator {
    state: Mutex<BatchState>,
    store: Arc<OutputStore>,
    events: broadcast::Sender<BatchEvent>,
    running: AtomicBool,
    limits: BatchLimits,
    options: ConvertOptions,
}

impl Default for Orchestrator {
    fn default() -> Self {
        Self::new(BatchLimits::default(), ConvertOptions::default())
    }
}

impl Orchestrator {
    pub fn new(limits: BatchLimits, options: ConvertOptions) -> Self {
        let (events, _rx) = broadcast::channel(EVENT_CAPACITY);
        Self {
            state: Mutex::new(BatchState::default()),
            store: Arc::new(OutputStore::new()),
            events,
            running: AtomicBool::new(false),
            limits,
            options,
        }
    }

    /// 배치 이벤트 구독
    pub fn subscribe(&self) -> broadcast::Receiver<BatchEvent> {
        self.events.subscribe()
    }

    pub fn limits(&self) -> &BatchLimits {
        &self.limits
    }

    /// 출력 저장소 (핸들 누수 확인용)
    pub fn store(&self) -> &OutputStore {
        &self.store
    }

    /// 파일 등록
    ///
    /// 크기 초과/미지원 확장자 파일을 먼저 걸러낸 뒤, 남은 자리만큼만 `waiting` 상태로 등록합니다.
    /// 자리가 부족하면 뒤쪽 파일이 `BatchFull`로 거부됩니다.
    pub fn enqueue<I>(&self, files: I) -> Admission
    where
        I: IntoIterator<Item = SourceFile>,
    {
        let mut admission = Admission::default();
        let mut added = Vec::new();

        {
            let mut state = self.lock();
            for source in files {
                if let Err(reason) = self.limits.check(&source.name, source.size()) {
                    admission.rejected.push(Rejected {
                        name: source.name,
                        reason,
                    });
                    continue;
                }

                if state.items.len() >= self.limits.max_files {
                    admission.rejected.push(Rejected {
                        name: source.name,
                        reason: RejectReason::BatchFull,
                    });
                    continue;
                }

                let item = ConversionItem::new(source);
                tracing::debug!(id = %item.id, file = %item.source.name, "항목 등록");
                admission.accepted.push(item.id);
                added.push(item.snapshot());
                state.order.push(item.id);
                state.items.insert(item.id, item);
            }
        }

        for snapshot in added {
            self.publish(BatchEvent::Added(snapshot));
        }
        admission
    }

    /// 대상 포맷 지정 (대기 상태에서만)
    pub fn set_target(&self, id: ItemId, format: &str) -> Result<ItemSnapshot> {
        let snapshot = {
            let mut state = self.lock();
            let item = state
                .items
                .get(&id)
                .ok_or(ImgConvertError::ItemNotFound { id })?;

            if item.status != ItemStatus::Waiting {
                return Err(ImgConvertError::NotWaiting {
                    id,
                    status: item.status,
                });
            }

            let mut next = item.clone();
            next.target_format = format.trim().to_lowercase();
            let snapshot = next.snapshot();
            state.items.insert(id, next);
            snapshot
        };

        self.publish(BatchEvent::Updated(snapshot.clone()));
        Ok(snapshot)
    }

    /// 항목 제거 (상태와 무관, 출력 핸들 해제)
    pub fn remove(&self, id: ItemId) -> Result<ItemSnapshot> {
        let item = {
            let mut state = self.lock();
            let item = state
                .items
                .remove(&id)
                .ok_or(ImgConvertError::ItemNotFound { id })?;
            state.order.retain(|other| *other != id);
            item
        };

        self.release(&item);
        tracing::debug!(%id, status = %item.status, "항목 제거");
        self.publish(BatchEvent::Removed(id));
        Ok(item.snapshot())
    }

    /// 모든 항목 제거
    ///
    /// # Returns
    /// 제거된 항목 수
    pub fn clear(&self) -> usize {
        let items: Vec<ConversionItem> = {
            let mut state = self.lock();
            state.order.clear();
            state.items.drain().map(|(_, item)| item).collect()
        };

        for item in &items {
            self.release(item);
        }
        self.publish(BatchEvent::Cleared);
        items.len()
    }

    /// 삽입 순서대로 모든 항목의 스냅샷
    pub fn items(&self) -> Vec<ItemSnapshot> {
        self.lock().ordered().map(ConversionItem::snapshot).collect()
    }

    pub fn get(&self, id: ItemId) -> Option<ItemSnapshot> {
        self.lock().items.get(&id).map(ConversionItem::snapshot)
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 남은 자리 수
    pub fn remaining_capacity(&self) -> usize {
        self.limits.max_files.saturating_sub(self.len())
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// 변환을 시작할 수 있는 항목이 있는지
    pub fn has_pending(&self) -> bool {
        self.lock().items.values().any(ConversionItem::is_eligible)
    }

    /// 항목이 있고 모두 완료되었는지
    pub fn all_finished(&self) -> bool {
        let state = self.lock();
        !state.items.is_empty()
            && state
                .items
                .values()
                .all(|item| item.status == ItemStatus::Finished)
    }

    /// 대상 포맷이 지정된 모든 대기 항목을 동시에 변환
    ///
    /// 각 항목은 시작 시점에 바로 `converting`으로 바뀌고, 결과는 항목별로 독립적으로 반영됩니다.
    /// 한 항목의 실패는 다른 항목에 영향을 주지 않으며, 이 함수 자체는 모든 항목이
    /// 끝날 때까지 기다린 뒤 요약을 반환합니다. 진행 중에 다시 호출하면 `RunInProgress`.
    ///
    /// 반환된 future는 끝까지 기다려야 합니다. 중간에 버리면 진행 중인 항목의 결과가 반영되지 않습니다.
    pub async fn run_all(&self) -> Result<RunSummary> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(ImgConvertError::RunInProgress);
        }
        let _guard = RunGuard(&self.running);
        let started = Instant::now();

        let launches = self.launch_eligible();
        let mut summary = RunSummary {
            launched: launches.len(),
            ..Default::default()
        };
        self.publish(BatchEvent::RunStarted {
            launched: summary.launched,
        });
        tracing::info!(launched = summary.launched, "배치 변환 시작");

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut launched_ids = Vec::with_capacity(launches.len());

        for (id, source, target) in launches {
            launched_ids.push(id);
            let tx = tx.clone();
            let options = self.options.clone();

            tokio::spawn(async move {
                let outcome = convert_item(&source, &target, &options, |progress| {
                    let _ = tx.send(ItemUpdate::Progress { id, progress });
                })
                .await;

                let update = match outcome {
                    Ok(blob) => ItemUpdate::Finished { id, blob },
                    Err(e) => ItemUpdate::Failed {
                        id,
                        message: e.to_string(),
                    },
                };
                let _ = tx.send(update);
            });
        }
        // 모든 작업이 끝나 송신자가 사라지면 수신 루프 종료
        drop(tx);

        while let Some(update) = rx.recv().await {
            let terminal = !matches!(update, ItemUpdate::Progress { .. });
            match self.apply(update) {
                Applied::Updated(ItemStatus::Finished) => summary.finished += 1,
                Applied::Updated(ItemStatus::Error) => summary.failed += 1,
                Applied::Discarded if terminal => summary.discarded += 1,
                _ => {}
            }
        }

        // 작업이 결과를 보내지 못하고 끝난 경우 (패닉 등)
        for id in launched_ids {
            let stalled = self
                .get(id)
                .is_some_and(|item| item.status == ItemStatus::Converting);
            if stalled {
                let update = ItemUpdate::Failed {
                    id,
                    message: "변환 작업이 비정상 종료되었습니다".to_string(),
                };
                if self.apply(update) == Applied::Updated(ItemStatus::Error) {
                    summary.failed += 1;
                }
            }
        }

        summary.elapsed = started.elapsed();
        tracing::info!(
            finished = summary.finished,
            failed = summary.failed,
            discarded = summary.discarded,
            "배치 변환 완료"
        );
        self.publish(BatchEvent::RunFinished(summary.clone()));
        Ok(summary)
    }

    /// 대상 항목을 `converting`으로 전환하고 작업 입력을 복사해 반환
    fn launch_eligible(&self) -> Vec<(ItemId, SourceFile, String)> {
        let mut launched = Vec::new();
        let mut snapshots = Vec::new();

        {
            let mut state = self.lock();
            let eligible: Vec<ItemId> = state
                .ordered()
                .filter(|item| item.is_eligible())
                .map(|item| item.id)
                .collect();

            for id in eligible {
                let Some(item) = state.items.get(&id) else {
                    continue;
                };
                let mut next = item.clone();
                next.status = ItemStatus::Converting;
                next.progress = 0;

                launched.push((id, next.source.clone(), next.target_format.clone()));
                snapshots.push(next.snapshot());
                state.items.insert(id, next);
            }
        }

        for snapshot in snapshots {
            self.publish(BatchEvent::Updated(snapshot));
        }
        launched
    }

    /// 항목 레코드 갱신의 단일 진입점
    ///
    /// 현재 레코드를 복사해 다음 상태를 만든 뒤 통째로 교체합니다.
    /// 뒤로 가는 전이나 감소하는 진행률은 무시하며, 이미 제거된 항목의 결과는 버립니다.
    fn apply(&self, update: ItemUpdate) -> Applied {
        let id = update.id();
        let snapshot = {
            let mut state = self.lock();
            let Some(current) = state.items.get(&id) else {
                tracing::debug!(%id, "제거된 항목의 결과 폐기");
                return Applied::Discarded;
            };

            let mut next = current.clone();
            match update {
                ItemUpdate::Progress { progress, .. } => {
                    if current.status != ItemStatus::Converting || progress <= current.progress {
                        return Applied::Ignored;
                    }
                    next.progress = progress.min(100);
                }
                ItemUpdate::Finished { blob, .. } => {
                    if !current.status.can_transition_to(ItemStatus::Finished) {
                        return Applied::Ignored;
                    }
                    let size = blob.len() as u64;
                    let content_type = blob.content_type;
                    next.output = Some(ItemOutput {
                        handle: self.store.acquire(blob),
                        content_type,
                        size,
                    });
                    next.status = ItemStatus::Finished;
                    next.progress = 100;
                }
                ItemUpdate::Failed { message, .. } => {
                    if !current.status.can_transition_to(ItemStatus::Error) {
                        return Applied::Ignored;
                    }
                    tracing::warn!(%id, file = %current.source.name, error = %message, "항목 변환 실패");
                    next.status = ItemStatus::Error;
                    next.progress = 0;
                    next.error_message = Some(if message.is_empty() {
                        "변환 실패".to_string()
                    } else {
                        message
                    });
                }
            }

            let snapshot = next.snapshot();
            state.items.insert(id, next);
            snapshot
        };

        let status = snapshot.status;
        self.publish(BatchEvent::Updated(snapshot));
        Applied::Updated(status)
    }

    /// 완료된 항목 하나를 묶음 없이 그대로 다운로드
    pub fn download(&self, id: ItemId) -> Result<Download> {
        let (file_name, handle) = {
            let state = self.lock();
            let item = state
                .items
                .get(&id)
                .ok_or(ImgConvertError::ItemNotFound { id })?;
            match (&item.output, item.status) {
                (Some(output), ItemStatus::Finished) => (
                    registry::output_name(&item.source.name, &item.target_format),
                    output.handle.clone(),
                ),
                _ => return Err(ImgConvertError::NotFinished { id }),
            }
        };

        let blob = self
            .store
            .fetch(&handle)
            .ok_or(ImgConvertError::NotFinished { id })?;
        Ok(Download { file_name, blob })
    }

    /// 완료된 모든 항목을 ZIP 하나로 묶음
    ///
    /// 실패해도 배치 상태는 그대로이므로 다시 시도하거나 항목별로 다운로드할 수 있습니다.
    pub fn export_all(&self) -> Result<Archive> {
        let items: Vec<ConversionItem> = self.lock().ordered().cloned().collect();
        export::export_all(&items, &self.store)
    }

    fn release(&self, item: &ConversionItem) {
        if let Some(output) = &item.output {
            self.store.release(&output.handle);
        }
    }

    fn publish(&self, event: BatchEvent) {
        // 구독자가 없으면 전송 실패는 정상
        let _ = self.events.send(event);
    }

    fn lock(&self) -> MutexGuard<'_, BatchState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        let released = self.store.release_all();
        if released > 0 {
            tracing::debug!(released, "남은 출력 핸들 해제");
        }
    }
}

/// 항목 하나 변환 (원본 확장자 기준 변환 가능 여부 확인 포함)
async fn convert_item<F>(
    source: &SourceFile,
    target: &str,
    options: &ConvertOptions,
    mut on_progress: F,
) -> Result<Blob>
where
    F: FnMut(u8),
{
    let allowed = Format::parse(target)
        .is_some_and(|f| registry::convertible_formats(&source.extension()).contains(&f));
    if Format::target(target).is_ok() && !allowed {
        on_progress(0);
        return Err(ImgConvertError::UnsupportedFormat {
            format: format!("{} → {}", source.extension(), target),
        });
    }

    convert::convert(source, target, options, on_progress).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, Rgb, RgbImage};

    fn png(name: &str) -> SourceFile {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(6, 4, Rgb([9, 9, 9])));
        SourceFile::new(name, crate::codec::encode(&img, Format::Png, 100).unwrap())
    }

    fn orchestrator() -> Orchestrator {
        Orchestrator::new(
            BatchLimits::new(),
            ConvertOptions::new().with_tick_interval(Duration::from_millis(5)),
        )
    }

    #[test]
    fn test_limits_check() {
        let limits = BatchLimits::new().with_max_file_size(10);
        assert!(limits.check("a.png", 10).is_ok());
        assert!(matches!(
            limits.check("a.png", 11),
            Err(RejectReason::TooLarge { size: 11, limit: 10 })
        ));
        assert_eq!(
            limits.check("a.txt", 1),
            Err(RejectReason::UnrecognizedExtension)
        );
        assert_eq!(limits.check("noext", 1), Err(RejectReason::UnrecognizedExtension));
    }

    #[test]
    fn test_enqueue_respects_cap() {
        let orch = orchestrator();
        let first = orch.enqueue((0..7).map(|i| png(&format!("a{i}.png"))));
        assert_eq!(first.accepted.len(), 7);

        let second = orch.enqueue((0..5).map(|i| png(&format!("b{i}.png"))));
        assert_eq!(second.accepted.len(), 3);
        assert_eq!(second.rejected.len(), 2);
        assert!(second
            .rejected
            .iter()
            .all(|r| r.reason == RejectReason::BatchFull));
        assert_eq!(second.rejected[0].name, "b3.png");

        assert_eq!(orch.len(), MAX_FILES);
        assert_eq!(orch.remaining_capacity(), 0);
    }

    #[test]
    fn test_enqueue_filters_before_cap() {
        let orch = Orchestrator::new(BatchLimits::new().with_max_files(2), ConvertOptions::new());
        let admission = orch.enqueue(vec![
            SourceFile::new("notes.txt", vec![1u8]),
            png("a.png"),
            png("b.png"),
            png("c.png"),
        ]);

        assert_eq!(admission.accepted.len(), 2);
        assert_eq!(admission.rejected[0].reason, RejectReason::UnrecognizedExtension);
        assert_eq!(admission.rejected[1].reason, RejectReason::BatchFull);
        assert_eq!(admission.rejected[1].name, "c.png");
    }

    #[test]
    fn test_items_keep_insertion_order() {
        let orch = orchestrator();
        orch.enqueue(vec![png("z.png"), png("a.png"), png("m.png")]);
        let names: Vec<String> = orch.items().into_iter().map(|i| i.name).collect();
        assert_eq!(names, vec!["z.png", "a.png", "m.png"]);
    }

    #[test]
    fn test_set_target_and_remove() {
        let orch = orchestrator();
        let id = orch.enqueue(vec![png("a.png")]).accepted[0];

        let snapshot = orch.set_target(id, " WEBP ").unwrap();
        assert_eq!(snapshot.target_format, "webp");
        assert!(orch.has_pending());

        let removed = orch.remove(id).unwrap();
        assert_eq!(removed.name, "a.png");
        assert!(orch.is_empty());
        assert!(matches!(
            orch.remove(id),
            Err(ImgConvertError::ItemNotFound { .. })
        ));
        assert!(matches!(
            orch.set_target(id, "png"),
            Err(ImgConvertError::ItemNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_run_all_converts_only_targeted_items() {
        let orch = orchestrator();
        let ids = orch.enqueue(vec![png("a.png"), png("b.png")]).accepted;
        orch.set_target(ids[0], "gif").unwrap();

        let summary = orch.run_all().await.unwrap();
        assert_eq!(summary.launched, 1);
        assert_eq!(summary.finished, 1);

        assert_eq!(orch.get(ids[0]).unwrap().status, ItemStatus::Finished);
        assert_eq!(orch.get(ids[1]).unwrap().status, ItemStatus::Waiting);
        assert!(!orch.all_finished());
        assert!(!orch.is_running());
    }

    #[tokio::test]
    async fn test_set_target_rejected_after_conversion() {
        let orch = orchestrator();
        let id = orch.enqueue(vec![png("a.png")]).accepted[0];
        orch.set_target(id, "bmp").unwrap();
        orch.run_all().await.unwrap();

        assert!(matches!(
            orch.set_target(id, "jpg"),
            Err(ImgConvertError::NotWaiting {
                status: ItemStatus::Finished,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_self_conversion_fails_item() {
        let orch = orchestrator();
        let id = orch.enqueue(vec![png("a.png")]).accepted[0];
        orch.set_target(id, "png").unwrap();

        let summary = orch.run_all().await.unwrap();
        assert_eq!(summary.failed, 1);

        let item = orch.get(id).unwrap();
        assert_eq!(item.status, ItemStatus::Error);
        assert_eq!(item.progress, 0);
        assert!(!item.error_message.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_remove_and_clear_release_handles() {
        let orch = orchestrator();
        let ids = orch.enqueue(vec![png("a.png"), png("b.png"), png("c.png")]).accepted;
        for id in &ids {
            orch.set_target(*id, "jpg").unwrap();
        }
        orch.run_all().await.unwrap();
        assert_eq!(orch.store().live_handles(), 3);

        orch.remove(ids[0]).unwrap();
        assert_eq!(orch.store().live_handles(), 2);

        assert_eq!(orch.clear(), 2);
        assert_eq!(orch.store().live_handles(), 0);
    }

    #[tokio::test]
    async fn test_download_requires_finished() {
        let orch = orchestrator();
        let id = orch.enqueue(vec![png("photo.png")]).accepted[0];
        assert!(matches!(
            orch.download(id),
            Err(ImgConvertError::NotFinished { .. })
        ));

        orch.set_target(id, "webp").unwrap();
        orch.run_all().await.unwrap();

        let download = orch.download(id).unwrap();
        assert_eq!(download.file_name, "photo.webp");
        assert_eq!(download.blob.content_type, "image/webp");
    }

    #[tokio::test]
    async fn test_apply_ignores_backward_updates() {
        let orch = orchestrator();
        let id = orch.enqueue(vec![png("a.png")]).accepted[0];

        // 대기 상태에서는 진행률/완료 모두 무시
        assert_eq!(
            orch.apply(ItemUpdate::Progress { id, progress: 50 }),
            Applied::Ignored
        );
        assert_eq!(
            orch.apply(ItemUpdate::Failed {
                id,
                message: "x".to_string()
            }),
            Applied::Ignored
        );

        orch.set_target(id, "gif").unwrap();
        orch.run_all().await.unwrap();

        // 완료 후에는 진행률 감소나 실패로 되돌아가지 않음
        assert_eq!(
            orch.apply(ItemUpdate::Progress { id, progress: 10 }),
            Applied::Ignored
        );
        assert_eq!(
            orch.apply(ItemUpdate::Failed {
                id,
                message: "late".to_string()
            }),
            Applied::Ignored
        );
        assert_eq!(orch.get(id).unwrap().status, ItemStatus::Finished);

        orch.remove(id).unwrap();
        assert_eq!(
            orch.apply(ItemUpdate::Progress { id, progress: 20 }),
            Applied::Discarded
        );
    }

    #[test]
    fn test_drop_releases_outputs() {
        let orch = orchestrator();
        let store = Arc::clone(&orch.store);
        store.acquire(Blob::new(vec![1u8], "image/png"));
        drop(orch);
        assert_eq!(store.live_handles(), 0);
    }
}
