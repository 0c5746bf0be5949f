//! Flattening of the detail and device tables into report records.

use std::collections::HashMap;

use netstats_common::{StatsKey, StatsValue};

use crate::{
    error::StatsError,
    model::{CounterValue, ReportRecord, TAG_NONE, TrafficSet, UID_ALL},
    policy::TrafficSetPolicy,
    resolver::InterfaceResolver,
    store::KeyedStore,
    unknown_iface::{RowId, UnknownInterfaceTracker},
};

/// Records produced by one parse, plus the malformed rows left out.
#[derive(Debug, Default)]
pub struct ParsedStats {
    pub records: Vec<ReportRecord>,
    pub skipped_rows: usize,
}

/// Memoises name lookups for the duration of one parse so an index resolves
/// to the same name every time it is seen.
struct NameCache<'a, R: ?Sized> {
    resolver: &'a R,
    names: HashMap<u32, Option<String>>,
}

impl<'a, R: InterfaceResolver + ?Sized> NameCache<'a, R> {
    fn new(resolver: &'a R) -> Self {
        Self {
            resolver,
            names: HashMap::new(),
        }
    }

    fn resolve(&mut self, iface_index: u32) -> Option<&str> {
        let resolver = self.resolver;
        self.names
            .entry(iface_index)
            .or_insert_with(|| resolver.resolve(iface_index))
            .as_deref()
    }
}

fn collect_rows<S, R, F>(
    table: &S,
    table_name: &'static str,
    names: &R,
    tracker: &mut UnknownInterfaceTracker,
    iface_of: impl Fn(&S::Key) -> u32,
    mut build: F,
) -> Result<ParsedStats, StatsError>
where
    S: KeyedStore<Value = StatsValue> + ?Sized,
    S::Key: Copy + Into<RowId>,
    R: InterfaceResolver + ?Sized,
    F: FnMut(&S::Key, &str, CounterValue) -> ReportRecord,
{
    let rows = table.iterate().map_err(StatsError::unavailable(table_name))?;
    let mut cache = NameCache::new(names);
    let mut parsed = ParsedStats::default();

    for row in rows {
        let (key, value) = match row {
            Ok(row) => row,
            Err(err) => {
                log::warn!("skipping {table_name} row: {err}");
                parsed.skipped_rows += 1;
                continue;
            }
        };
        let iface_index = iface_of(&key);
        match cache.resolve(iface_index) {
            Some(iface) => parsed.records.push(build(&key, iface, value.into())),
            None => tracker.record_row(iface_index, table, &key),
        }
    }

    if parsed.skipped_rows > 0 {
        log::warn!(
            "{} malformed {table_name} rows skipped",
            parsed.skipped_rows
        );
    }
    Ok(parsed)
}

/// Enumerates the per-(uid, tag, interface) table.
///
/// Rows whose interface cannot be named are charged to `tracker` and left
/// out of the result.
pub fn parse_detail<S, R>(
    table: &S,
    names: &R,
    policy: &dyn TrafficSetPolicy,
    tracker: &mut UnknownInterfaceTracker,
) -> Result<ParsedStats, StatsError>
where
    S: KeyedStore<Key = StatsKey, Value = StatsValue> + ?Sized,
    R: InterfaceResolver + ?Sized,
{
    collect_rows(
        table,
        "detail",
        names,
        tracker,
        |key| key.iface_index,
        |key, iface, counters| {
            ReportRecord::new(iface, key.uid, policy.traffic_set(key), key.tag, counters)
        },
    )
}

/// Enumerates the per-interface table. Owner and set are always "all".
pub fn parse_device<S, R>(
    table: &S,
    names: &R,
    tracker: &mut UnknownInterfaceTracker,
) -> Result<ParsedStats, StatsError>
where
    S: KeyedStore<Key = u32, Value = StatsValue> + ?Sized,
    R: InterfaceResolver + ?Sized,
{
    collect_rows(
        table,
        "device",
        names,
        tracker,
        |index| *index,
        |_, iface, counters| ReportRecord::new(iface, UID_ALL, TrafficSet::All, TAG_NONE, counters),
    )
}
