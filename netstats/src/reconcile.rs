//! Garbage collection of the socket-cookie -> (uid, tag) table.
//!
//! Entries are added whenever an application tags a socket but nothing
//! removes them once the socket's counters have rolled off. A pass deletes
//! every mapping with no live detail row for its (uid, tag).

use std::collections::HashSet;

use netstats_common::{StatsKey, StatsValue, UidTagValue};

use crate::{
    error::StatsError,
    store::{DeleteOutcome, KeyedStore},
};

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ReconcileReport {
    /// Mapping entries examined.
    pub scanned: usize,
    pub deleted: usize,
    /// Stale entries someone else removed first.
    pub already_absent: usize,
    /// Per-entry failures, skipped for this pass.
    pub failed: usize,
    /// Detail rows that could not be read. Non-zero means the pass deleted
    /// nothing because the live set was incomplete.
    pub unreadable_rows: usize,
}

/// Deletes tag mappings whose (uid, tag) has no row left in `stats`.
///
/// The mapping key set is snapshotted before the live set is built, so a
/// counter row created while the pass runs can only keep more entries alive.
/// A stats snapshot with unreadable rows is incomplete; the pass then
/// deletes nothing rather than risk dropping a live mapping.
pub fn reconcile<M, S>(tag_map: &M, stats: &S) -> Result<ReconcileReport, StatsError>
where
    M: KeyedStore<Key = u64, Value = UidTagValue> + ?Sized,
    S: KeyedStore<Key = StatsKey, Value = StatsValue> + ?Sized,
{
    let mut mappings = Vec::new();
    let mut report = ReconcileReport::default();
    for row in tag_map.iterate().map_err(StatsError::unavailable("cookie tag"))? {
        match row {
            Ok(entry) => mappings.push(entry),
            Err(err) => {
                log::warn!("skipping cookie tag row: {err}");
                report.failed += 1;
            }
        }
    }

    let mut live = HashSet::new();
    for row in stats.iterate().map_err(StatsError::unavailable("detail"))? {
        match row {
            Ok((key, _)) => {
                live.insert((key.uid, key.tag));
            }
            Err(_) => report.unreadable_rows += 1,
        }
    }
    if report.unreadable_rows > 0 {
        log::warn!(
            "{} unreadable detail rows, skipping tag map cleanup",
            report.unreadable_rows
        );
        report.scanned = mappings.len();
        return Ok(report);
    }

    for (cookie, value) in mappings {
        report.scanned += 1;
        if live.contains(&(value.uid, value.tag)) {
            continue;
        }
        match tag_map.delete(&cookie) {
            Ok(DeleteOutcome::Deleted) => report.deleted += 1,
            Ok(DeleteOutcome::AlreadyAbsent) => report.already_absent += 1,
            Err(err) => {
                log::warn!("failed to delete cookie {cookie:#x}: {err}");
                report.failed += 1;
            }
        }
    }

    log::debug!(
        "tag map cleanup: scanned {} deleted {} already gone {} failed {}",
        report.scanned,
        report.deleted,
        report.already_absent,
        report.failed
    );
    Ok(report)
}
