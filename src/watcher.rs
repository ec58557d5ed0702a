//! 파일 시스템 감시 모듈
//!
//! 백업 폴더 하위 트리를 재귀적으로 감시하고, 생성/수정 이벤트만 골라
//! 세션의 단일 제어 채널로 전달합니다.

use std::path::{Path, PathBuf};

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::sync_engine::SyncError;

/// Bounded so a flood of events cannot exhaust memory.
pub const WATCH_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Created,
    Modified,
}

/// A single path-level notification, before any filtering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawChange {
    pub path: PathBuf,
    pub kind: ChangeKind,
}

impl RawChange {
    /// 실제 파일 생성/수정 이벤트만 변환합니다. 삭제 등은 무시합니다.
    pub fn from_notify_event(event: &Event) -> Vec<RawChange> {
        let kind = match event.kind {
            EventKind::Create(_) => ChangeKind::Created,
            EventKind::Modify(_) => ChangeKind::Modified,
            _ => return Vec::new(),
        };

        event
            .paths
            .iter()
            .map(|path| RawChange {
                path: path.clone(),
                kind,
            })
            .collect()
    }
}

/// Recursive watch over one root. Watching ends when the source is dropped.
pub struct FsWatchSource {
    _watcher: RecommendedWatcher,
}

impl FsWatchSource {
    pub fn start(root: &Path, tx: mpsc::Sender<RawChange>) -> Result<Self, SyncError> {
        let mut watcher =
            notify::recommended_watcher(move |res: std::result::Result<Event, notify::Error>| {
                if let Ok(event) = res {
                    for change in RawChange::from_notify_event(&event) {
                        // 채널이 가득 차면 건너뜁니다 (backpressure)
                        if tx.try_send(change).is_err() {
                            break;
                        }
                    }
                }
            })?;

        watcher
            .watch(root, RecursiveMode::Recursive)
            .map_err(|e| SyncError::WatchStart(format!("{}: {e}", root.display())))?;

        Ok(Self {
            _watcher: watcher,
        })
    }
}
