//! Bounded accounting of traffic dropped because its interface has no name.
//!
//! Rows whose ifindex cannot be resolved are left out of parsed reports.
//! The tracker adds up what was left out and raises exactly one alert once
//! the undercount becomes material, then goes quiet for the rest of its
//! context.
//!
//! Kernel counters are cumulative, so a row seen again in a later parse only
//! adds what it grew by since the tracker last read it.

use std::{collections::HashMap, sync::Arc};

use netstats_common::{StatsKey, StatsValue};

use crate::{model::CounterValue, store::KeyedStore};

/// Undercount, in rx+tx bytes, that triggers the alert.
pub const DEFAULT_ALERT_THRESHOLD_BYTES: i64 = 100 * 1000;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct UnknownInterfaceAlert {
    pub iface_index: u32,
    pub undercount_bytes: i64,
}

/// Receiver of the single-shot unknown-interface alert.
pub trait AlertSink: Send + Sync {
    fn unknown_interface(&self, alert: UnknownInterfaceAlert);
}

/// Default sink: an error-level log line.
#[derive(Debug, Default)]
pub struct LogAlertSink;

impl AlertSink for LogAlertSink {
    fn unknown_interface(&self, alert: UnknownInterfaceAlert) {
        log::error!(
            "Unknown name for ifindex {} with more than {} bytes of traffic",
            alert.iface_index,
            alert.undercount_bytes
        );
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TrackerState {
    Accumulating(i64),
    Suppressed,
}

/// Identity of a counter row across parses.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum RowId {
    Detail(StatsKey),
    Device(u32),
}

impl From<StatsKey> for RowId {
    fn from(key: StatsKey) -> Self {
        RowId::Detail(key)
    }
}

impl From<u32> for RowId {
    fn from(iface_index: u32) -> Self {
        RowId::Device(iface_index)
    }
}

pub struct UnknownInterfaceTracker {
    state: TrackerState,
    threshold: i64,
    sink: Arc<dyn AlertSink>,
    // rx+tx bytes already charged for each unresolved row
    counted: HashMap<RowId, i64>,
}

impl UnknownInterfaceTracker {
    pub fn new(threshold: i64, sink: Arc<dyn AlertSink>) -> Self {
        Self {
            state: TrackerState::Accumulating(0),
            threshold,
            sink,
            counted: HashMap::new(),
        }
    }

    pub fn state(&self) -> TrackerState {
        self.state
    }

    /// Starts a new tracking context.
    pub fn reset(&mut self) {
        self.state = TrackerState::Accumulating(0);
        self.counted.clear();
    }

    /// Adds `bytes` of unattributable traffic seen on `iface_index`.
    pub fn record(&mut self, iface_index: u32, bytes: i64) {
        let TrackerState::Accumulating(total) = self.state else {
            return;
        };
        let total = total.saturating_add(bytes);
        if total >= self.threshold {
            self.sink.unknown_interface(UnknownInterfaceAlert {
                iface_index,
                undercount_bytes: total,
            });
            self.state = TrackerState::Suppressed;
        } else {
            self.state = TrackerState::Accumulating(total);
        }
    }

    /// Re-reads `key` from `table` and records the rx+tx bytes it gained
    /// since this tracker last charged it.
    ///
    /// A row that has already vanished undercounts nothing and is ignored.
    pub fn record_row<S>(&mut self, iface_index: u32, table: &S, key: &S::Key)
    where
        S: KeyedStore<Value = StatsValue> + ?Sized,
        S::Key: Copy + Into<RowId>,
    {
        if self.state == TrackerState::Suppressed {
            return;
        }
        let Ok(Some(value)) = table.read(key) else {
            return;
        };
        let bytes = CounterValue::from(value).total_bytes();
        let last = self.counted.insert((*key).into(), bytes).unwrap_or(0);
        // A reading below the last one means the row was recreated from zero.
        let grown = if bytes >= last { bytes - last } else { bytes };
        if grown > 0 {
            self.record(iface_index, grown);
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::store::MemoryStore;

    #[derive(Default)]
    pub(crate) struct RecordingSink {
        pub alerts: Mutex<Vec<UnknownInterfaceAlert>>,
    }

    impl RecordingSink {
        pub(crate) fn alerts(&self) -> Vec<UnknownInterfaceAlert> {
            self.alerts.lock().unwrap().clone()
        }
    }

    impl AlertSink for RecordingSink {
        fn unknown_interface(&self, alert: UnknownInterfaceAlert) {
            self.alerts.lock().unwrap().push(alert);
        }
    }

    #[test]
    fn alerts_once_when_threshold_reached() {
        let sink = Arc::new(RecordingSink::default());
        let mut tracker = UnknownInterfaceTracker::new(1000, sink.clone());
        tracker.record(3, 400);
        tracker.record(4, 500);
        assert!(sink.alerts().is_empty());
        assert_eq!(tracker.state(), TrackerState::Accumulating(900));

        tracker.record(5, 100);
        assert_eq!(
            sink.alerts(),
            vec![UnknownInterfaceAlert {
                iface_index: 5,
                undercount_bytes: 1000
            }]
        );
        assert_eq!(tracker.state(), TrackerState::Suppressed);

        tracker.record(6, 1_000_000);
        assert_eq!(sink.alerts().len(), 1);
    }

    #[test]
    fn reset_rearms_the_alert() {
        let sink = Arc::new(RecordingSink::default());
        let mut tracker = UnknownInterfaceTracker::new(10, sink.clone());
        tracker.record(1, 10);
        tracker.reset();
        tracker.record(2, 10);
        assert_eq!(sink.alerts().len(), 2);
    }

    #[test]
    fn record_row_reads_counters_from_the_table() {
        let sink = Arc::new(RecordingSink::default());
        let table: MemoryStore<u32, StatsValue> = [(
            9,
            StatsValue {
                rx_bytes: 60_000,
                rx_packets: 1,
                tx_bytes: 60_000,
                tx_packets: 1,
            },
        )]
        .into_iter()
        .collect();
        let mut tracker = UnknownInterfaceTracker::new(DEFAULT_ALERT_THRESHOLD_BYTES, sink.clone());
        tracker.record_row(9, &table, &9);
        assert_eq!(sink.alerts()[0].undercount_bytes, 120_000);
    }

    #[test]
    fn rereading_a_row_charges_only_its_growth() {
        let sink = Arc::new(RecordingSink::default());
        let table: MemoryStore<u32, StatsValue> = MemoryStore::new();
        let bytes = |rx, tx| StatsValue {
            rx_bytes: rx,
            rx_packets: 1,
            tx_bytes: tx,
            tx_packets: 1,
        };
        let mut tracker = UnknownInterfaceTracker::new(DEFAULT_ALERT_THRESHOLD_BYTES, sink.clone());

        table.insert(9, bytes(20_000, 20_000));
        for _ in 0..3 {
            tracker.record_row(9, &table, &9);
        }
        assert_eq!(tracker.state(), TrackerState::Accumulating(40_000));
        assert!(sink.alerts().is_empty());

        table.insert(9, bytes(50_000, 50_000));
        tracker.record_row(9, &table, &9);
        assert_eq!(
            sink.alerts(),
            vec![UnknownInterfaceAlert {
                iface_index: 9,
                undercount_bytes: 100_000
            }]
        );
    }

    #[test]
    fn recreated_row_is_charged_from_zero() {
        let sink = Arc::new(RecordingSink::default());
        let table: MemoryStore<StatsKey, StatsValue> = MemoryStore::new();
        let key = StatsKey { uid: 1, tag: 0, iface_index: 9 };
        let mut tracker = UnknownInterfaceTracker::new(DEFAULT_ALERT_THRESHOLD_BYTES, sink);

        table.insert(key, StatsValue { rx_bytes: 500, ..StatsValue::default() });
        tracker.record_row(9, &table, &key);
        table.insert(key, StatsValue { rx_bytes: 200, ..StatsValue::default() });
        tracker.record_row(9, &table, &key);
        assert_eq!(tracker.state(), TrackerState::Accumulating(700));
    }

    #[test]
    fn vanished_rows_add_nothing() {
        let sink = Arc::new(RecordingSink::default());
        let table: MemoryStore<u32, StatsValue> = MemoryStore::new();
        let mut tracker = UnknownInterfaceTracker::new(1, sink.clone());
        tracker.record_row(9, &table, &9);
        assert_eq!(tracker.state(), TrackerState::Accumulating(0));
    }
}
