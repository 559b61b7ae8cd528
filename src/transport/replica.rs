//! Viewer-side copy of one widget, kept current by applying drained deltas.

use crate::core::{Delta, Snapshot};
use crate::error::ReplicaError;
use crate::widgets::{WidgetConfig, WidgetKind, WidgetPath, WidgetValue};

/// What a viewer holds for one path.
#[derive(Debug, Clone, PartialEq)]
pub struct WidgetReplica {
    pub path: WidgetPath,
    pub incarnation: u64,
    pub config_epoch: u64,
    pub revision: u64,
    pub config: WidgetConfig,
    pub value: WidgetValue,
}

impl WidgetReplica {
    pub fn from_snapshot(snapshot: Snapshot) -> Self {
        Self {
            path: snapshot.path,
            incarnation: snapshot.incarnation,
            config_epoch: snapshot.config_epoch,
            revision: snapshot.revision,
            config: snapshot.config,
            value: snapshot.value,
        }
    }

    pub fn kind(&self) -> WidgetKind {
        self.config.kind()
    }

    /// Applies a delta for this path.
    ///
    /// A snapshot replaces everything. An incremental delta must start at the replica's
    /// revision; on any error the replica is left unchanged. `Gone` is handled by the
    /// owner, which drops the replica.
    pub fn apply(&mut self, delta: &Delta) -> Result<(), ReplicaError> {
        match delta {
            Delta::FullSnapshot(snapshot) => {
                *self = Self::from_snapshot(snapshot.clone());
                Ok(())
            }
            Delta::Incremental { from, to, patches } => {
                if *from != self.revision {
                    return Err(ReplicaError::RevisionGap {
                        path: self.path.to_string(),
                        have: self.revision,
                        from: *from,
                    });
                }
                self.value
                    .apply_all(patches)
                    .map_err(|source| ReplicaError::Patch {
                        path: self.path.to_string(),
                        source,
                    })?;
                self.revision = *to;
                Ok(())
            }
            Delta::NoChange { .. } | Delta::Gone => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::widgets::{CounterConfig, Patch};

    fn replica() -> WidgetReplica {
        WidgetReplica::from_snapshot(Snapshot {
            path: WidgetPath::new("c").unwrap(),
            incarnation: 1,
            config_epoch: 0,
            revision: 3,
            config: WidgetConfig::Counter(CounterConfig::default()),
            value: WidgetValue::Counter(3),
            resend: false,
        })
    }

    #[test]
    fn test_incremental_must_continue_revision() {
        let mut r = replica();
        r.apply(&Delta::Incremental {
            from: 3,
            to: 5,
            patches: vec![Patch::Int(5)],
        })
        .unwrap();
        assert_eq!((r.revision, &r.value), (5, &WidgetValue::Counter(5)));

        let err = r
            .apply(&Delta::Incremental {
                from: 7,
                to: 8,
                patches: vec![Patch::Int(8)],
            })
            .unwrap_err();
        assert_eq!(
            err,
            ReplicaError::RevisionGap {
                path: "c".into(),
                have: 5,
                from: 7
            }
        );
        assert_eq!(r.revision, 5);
    }

    #[test]
    fn test_bad_patch_leaves_replica_untouched() {
        let mut r = replica();
        let before = r.clone();
        let err = r
            .apply(&Delta::Incremental {
                from: 3,
                to: 4,
                patches: vec![Patch::Switched(true)],
            })
            .unwrap_err();
        assert!(matches!(err, ReplicaError::Patch { .. }));
        assert_eq!(r, before);
    }
}
