//! 출력 저장소 모듈
//!
//! 완료된 항목의 출력 바이너리를 보관하고 핸들로 조회합니다.
//! 핸들은 항목이 제거되거나 배치가 비워질 때 명시적으로 해제해야 합니다.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use crate::item::Blob;

/// 출력 바이너리를 가리키는 핸들
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OutputHandle(u64);

impl std::fmt::Display for OutputHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "output:{}", self.0)
    }
}

/// 핸들 기반 출력 저장소
#[derive(Debug, Default)]
pub struct OutputStore {
    next_id: AtomicU64,
    blobs: Mutex<HashMap<u64, Blob>>,
}

impl OutputStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 바이너리를 등록하고 새 핸들 발급
    pub fn acquire(&self, blob: Blob) -> OutputHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.lock().insert(id, blob);
        OutputHandle(id)
    }

    /// 핸들로 바이너리 조회 (해제된 핸들이면 None)
    pub fn fetch(&self, handle: &OutputHandle) -> Option<Blob> {
        self.lock().get(&handle.0).cloned()
    }

    /// 핸들 해제
    ///
    /// # Returns
    /// 실제로 해제되었는지 여부 (이미 해제된 핸들이면 false)
    pub fn release(&self, handle: &OutputHandle) -> bool {
        self.lock().remove(&handle.0).is_some()
    }

    /// 모든 핸들 해제
    pub fn release_all(&self) -> usize {
        let mut blobs = self.lock();
        let count = blobs.len();
        blobs.clear();
        count
    }

    /// 현재 살아 있는 핸들 수
    pub fn live_handles(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<u64, Blob>> {
        // 보관된 데이터는 불변 Blob뿐이므로 poison 상태여도 그대로 사용
        self.blobs.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_fetch_release() {
        let store = OutputStore::new();
        let handle = store.acquire(Blob::new(vec![1u8, 2, 3], "image/png"));

        assert_eq!(store.live_handles(), 1);
        assert_eq!(store.fetch(&handle).unwrap().len(), 3);

        assert!(store.release(&handle));
        assert!(!store.release(&handle));
        assert!(store.fetch(&handle).is_none());
        assert_eq!(store.live_handles(), 0);
    }

    #[test]
    fn test_handles_are_distinct() {
        let store = OutputStore::new();
        let a = store.acquire(Blob::new(vec![1u8], "image/png"));
        let b = store.acquire(Blob::new(vec![2u8], "image/gif"));

        assert_ne!(a, b);
        assert_eq!(store.release_all(), 2);
        assert!(store.fetch(&a).is_none());
    }
}
