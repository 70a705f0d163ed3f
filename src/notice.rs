// src/notice.rs

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::broadcast;

/// Visual/sound treatment of a notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Success,
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Notice {
    pub id: u64,
    pub kind: NoticeKind,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NoticeEvent {
    Shown(Notice),
    Dismissed(u64),
}

/// Transient toast/banner feed shared by the quiz and the comment thread.
///
/// Every shown notice is followed by a `Dismissed` event after `dismiss_after`,
/// independent of whatever else the caller does in the meantime.
#[derive(Debug, Clone)]
pub struct Notices {
    tx: broadcast::Sender<NoticeEvent>,
    next_id: Arc<AtomicU64>,
    dismiss_after: Duration,
}

impl Notices {
    pub fn new(dismiss_after: Duration) -> Self {
        let (tx, _) = broadcast::channel(64);
        Self {
            tx,
            next_id: Arc::new(AtomicU64::new(1)),
            dismiss_after,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<NoticeEvent> {
        self.tx.subscribe()
    }

    pub fn show(&self, kind: NoticeKind, message: impl Into<String>) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let notice = Notice {
            id,
            kind,
            message: message.into(),
        };
        tracing::debug!(id, ?kind, message = %notice.message, "notice shown");

        // No receivers is fine: nobody is rendering notices right now.
        let _ = self.tx.send(NoticeEvent::Shown(notice));

        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let tx = self.tx.clone();
            let delay = self.dismiss_after;
            handle.spawn(async move {
                tokio::time::sleep(delay).await;
                let _ = tx.send(NoticeEvent::Dismissed(id));
            });
        }

        id
    }

    pub fn success(&self, message: impl Into<String>) -> u64 {
        self.show(NoticeKind::Success, message)
    }

    pub fn info(&self, message: impl Into<String>) -> u64 {
        self.show(NoticeKind::Info, message)
    }

    pub fn warning(&self, message: impl Into<String>) -> u64 {
        self.show(NoticeKind::Warning, message)
    }

    pub fn error(&self, message: impl Into<String>) -> u64 {
        self.show(NoticeKind::Error, message)
    }
}

impl Default for Notices {
    fn default() -> Self {
        Self::new(Duration::from_millis(1800))
    }
}
