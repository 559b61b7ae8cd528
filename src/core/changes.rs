//! # Coalescing change queue.
//!
//! The registry pushes one [`Change`] per successful register/update/remove while it still
//! holds the widget's lock, so per path the queue always ends up with the newest entry.
//! Entries for the same path coalesce: only the latest revision is kept. Pushing never
//! blocks on consumers; the subscription manager absorbs the queue on its own schedule.
//!
//! ```text
//! Registry ──push──► ChangeQueue { path → latest Change } ──take──► SubscriptionManager
//!                        └── Notify ──► change pump task
//! ```

use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::Notify;

use crate::core::lock;
use crate::widgets::WidgetPath;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ChangeKind {
    Registered,
    Reconfigured,
    Updated,
    Removed,
}

/// Latest known change of one path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Change {
    pub path: WidgetPath,
    pub kind: ChangeKind,
    pub revision: u64,
}

#[derive(Default)]
pub(crate) struct ChangeQueue {
    pending: Mutex<HashMap<WidgetPath, Change>>,
    notify: Notify,
}

impl ChangeQueue {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Records a change, replacing any older entry for the same path.
    pub(crate) fn push(&self, change: Change) {
        lock::lock(&self.pending).insert(change.path.clone(), change);
        self.notify.notify_one();
    }

    /// Removes and returns every pending change.
    pub(crate) fn take(&self) -> Vec<Change> {
        lock::lock(&self.pending).drain().map(|(_, c)| c).collect()
    }

    /// Resolves after the next push (or immediately if one happened since the last wait).
    pub(crate) async fn notified(&self) {
        self.notify.notified().await;
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        lock::lock(&self.pending).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn change(path: &str, kind: ChangeKind, revision: u64) -> Change {
        Change {
            path: WidgetPath::new(path).unwrap(),
            kind,
            revision,
        }
    }

    #[test]
    fn test_coalesces_per_path() {
        let q = ChangeQueue::new();
        q.push(change("a", ChangeKind::Updated, 1));
        q.push(change("a", ChangeKind::Updated, 2));
        q.push(change("b", ChangeKind::Registered, 0));
        assert_eq!(q.len(), 2);

        let mut taken = q.take();
        taken.sort_by(|x, y| x.path.cmp(&y.path));
        assert_eq!(taken[0], change("a", ChangeKind::Updated, 2));
        assert_eq!(q.len(), 0);
    }

    #[tokio::test]
    async fn test_notify_is_not_lost() {
        let q = ChangeQueue::new();
        q.push(change("a", ChangeKind::Removed, 3));
        // permit stored before anyone waits
        tokio::time::timeout(std::time::Duration::from_secs(1), q.notified())
            .await
            .unwrap();
    }
}
