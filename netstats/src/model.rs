use std::{cmp::Ordering, fmt};

use netstats_common::StatsValue;
use serde::Serialize;

/// Owner id meaning "every owner"; disables the owner filter in totals.
pub const UID_ALL: u32 = u32::MAX;
/// Tag of untagged traffic.
pub const TAG_NONE: u32 = 0;
/// Maximum stored length of an interface name in a report record.
pub const MAX_IFACE_NAME_LEN: usize = 32;

/// Coarse classification of a record, orthogonal to its tag.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TrafficSet {
    All,
    Default,
    Foreground,
}

/// Consumer-side counter snapshot.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct CounterValue {
    pub rx_bytes: i64,
    pub rx_packets: i64,
    pub tx_bytes: i64,
    pub tx_packets: i64,
}

impl CounterValue {
    pub fn new(rx_bytes: i64, rx_packets: i64, tx_bytes: i64, tx_packets: i64) -> Self {
        Self {
            rx_bytes,
            rx_packets,
            tx_bytes,
            tx_packets,
        }
    }

    pub fn total_bytes(&self) -> i64 {
        self.rx_bytes.saturating_add(self.tx_bytes)
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::default()
    }
}

// Kernel counters are unsigned; anything past i64::MAX is clamped rather
// than allowed to flip sign.
fn clamp(raw: u64) -> i64 {
    i64::try_from(raw).unwrap_or(i64::MAX)
}

impl From<StatsValue> for CounterValue {
    fn from(value: StatsValue) -> Self {
        Self {
            rx_bytes: clamp(value.rx_bytes),
            rx_packets: clamp(value.rx_packets),
            tx_bytes: clamp(value.tx_bytes),
            tx_packets: clamp(value.tx_packets),
        }
    }
}

impl std::ops::AddAssign for CounterValue {
    fn add_assign(&mut self, rhs: Self) {
        self.rx_bytes = self.rx_bytes.wrapping_add(rhs.rx_bytes);
        self.rx_packets = self.rx_packets.wrapping_add(rhs.rx_packets);
        self.tx_bytes = self.tx_bytes.wrapping_add(rhs.tx_bytes);
        self.tx_packets = self.tx_packets.wrapping_add(rhs.tx_packets);
    }
}

impl std::iter::Sum for CounterValue {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), |mut acc, v| {
            acc += v;
            acc
        })
    }
}

impl fmt::Display for CounterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "rx_bytes: {} rx_packets: {} tx_bytes: {} tx_packets: {}",
            self.rx_bytes, self.rx_packets, self.tx_bytes, self.tx_packets
        )
    }
}

/// One flattened stats line handed to the report consumer.
///
/// Identity is `(iface, uid, set, tag)`; the counters are payload and take no
/// part in equality or ordering.
#[derive(Clone, Debug, Serialize)]
pub struct ReportRecord {
    pub iface: String,
    pub uid: u32,
    pub set: TrafficSet,
    pub tag: u32,
    #[serde(flatten)]
    pub counters: CounterValue,
}

impl ReportRecord {
    pub fn new(iface: &str, uid: u32, set: TrafficSet, tag: u32, counters: CounterValue) -> Self {
        Self {
            iface: bounded_name(iface),
            uid,
            set,
            tag,
            counters,
        }
    }

    fn identity(&self) -> (&str, u32, TrafficSet, u32) {
        (&self.iface, self.uid, self.set, self.tag)
    }
}

fn bounded_name(name: &str) -> String {
    if name.len() <= MAX_IFACE_NAME_LEN {
        return name.to_string();
    }
    let mut end = MAX_IFACE_NAME_LEN;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    name[..end].to_string()
}

impl PartialEq for ReportRecord {
    fn eq(&self, other: &Self) -> bool {
        self.identity() == other.identity()
    }
}

impl Eq for ReportRecord {}

impl PartialOrd for ReportRecord {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ReportRecord {
    fn cmp(&self, other: &Self) -> Ordering {
        self.identity().cmp(&other.identity())
    }
}

impl fmt::Display for ReportRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let uid = if self.uid == UID_ALL {
            "all".to_string()
        } else {
            self.uid.to_string()
        };
        write!(
            f,
            "{} uid:{} set:{:?} tag:{:#x} - {}",
            self.iface, uid, self.set, self.tag, self.counters
        )
    }
}
