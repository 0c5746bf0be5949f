//! Grouping of parsed records and summed point lookups.
//!
//! Totals are always sums over every matching row: one owner spans many
//! tags, and one interface name can be bound to several indices over time.
//! A filter that matches nothing yields zero, never an error. Malformed rows
//! are left out of a sum and counted in [`Total::skipped_rows`].

use netstats_common::{StatsKey, StatsValue};
use serde::Serialize;

use crate::{
    error::StatsError,
    model::{CounterValue, ReportRecord, UID_ALL},
    resolver::InterfaceResolver,
    store::KeyedStore,
};

/// Collapses records that share `(iface, uid, set, tag)` into one summed
/// record. The vector is sorted in place.
pub fn group(records: &mut Vec<ReportRecord>) {
    records.sort();
    records.dedup_by(|next, kept| {
        if next == kept {
            kept.counters += next.counters;
            true
        } else {
            false
        }
    });
}

/// A summed query result. `skipped_rows` counts malformed rows that could
/// not be read and are therefore missing from `counters`.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct Total {
    #[serde(flatten)]
    pub counters: CounterValue,
    pub skipped_rows: usize,
}

impl Total {
    /// True when every row of the table was read.
    pub fn is_complete(&self) -> bool {
        self.skipped_rows == 0
    }
}

fn sum_rows<S>(
    table: &S,
    table_name: &'static str,
    mut keep: impl FnMut(&S::Key) -> bool,
) -> Result<Total, StatsError>
where
    S: KeyedStore<Value = StatsValue> + ?Sized,
{
    let rows = table.iterate().map_err(StatsError::unavailable(table_name))?;
    let mut total = Total::default();
    for row in rows {
        match row {
            Ok((key, value)) if keep(&key) => total.counters += CounterValue::from(value),
            Ok(_) => {}
            Err(err) => {
                log::warn!("skipping {table_name} row: {err}");
                total.skipped_rows += 1;
            }
        }
    }
    Ok(total)
}

/// Sum of every detail row owned by `uid`; [`UID_ALL`] sums every row.
pub fn total_for_owner<S>(table: &S, uid: u32) -> Result<Total, StatsError>
where
    S: KeyedStore<Key = StatsKey, Value = StatsValue> + ?Sized,
{
    sum_rows(table, "detail", |key| uid == UID_ALL || key.uid == uid)
}

/// Sum of the device rows whose interface currently resolves to `name`.
pub fn total_for_interface_name<S, R>(
    table: &S,
    names: &R,
    name: &str,
) -> Result<Total, StatsError>
where
    S: KeyedStore<Key = u32, Value = StatsValue> + ?Sized,
    R: InterfaceResolver + ?Sized,
{
    sum_rows(table, "device", |index| {
        names.resolve(*index).as_deref() == Some(name)
    })
}

/// Sum of every device row whose interface still resolves to a name.
pub fn total_all_interfaces<S, R>(table: &S, names: &R) -> Result<Total, StatsError>
where
    S: KeyedStore<Key = u32, Value = StatsValue> + ?Sized,
    R: InterfaceResolver + ?Sized,
{
    sum_rows(table, "device", |index| names.resolve(*index).is_some())
}

/// Raw device counters for one index, zero when the index has no row.
pub fn total_for_interface_index<S>(table: &S, iface_index: u32) -> Result<CounterValue, StatsError>
where
    S: KeyedStore<Key = u32, Value = StatsValue> + ?Sized,
{
    let value = table
        .read(&iface_index)
        .map_err(StatsError::unavailable("device"))?;
    Ok(value.map(CounterValue::from).unwrap_or_default())
}
