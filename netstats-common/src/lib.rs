#![no_std]

// Row layouts shared between the kernel probe and the userspace reader.
// Keep this crate `no_std` friendly so the probe side can use it unchanged.

/// Kernel interface name width, including the trailing NUL.
pub const IFNAMSIZ: usize = 16;

/// Key of the per-(uid, tag, interface) detail table.
///
/// Field order doubles as the total order used for deterministic grouping.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct StatsKey {
    pub uid: u32,
    pub tag: u32,
    pub iface_index: u32,
}

/// Monotonic counters stored for every detail and device row.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct StatsValue {
    pub rx_bytes: u64,
    pub rx_packets: u64,
    pub tx_bytes: u64,
    pub tx_packets: u64,
}

/// Value of the ifindex -> name table.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct IfaceValue {
    pub name: [u8; IFNAMSIZ],
}

impl IfaceValue {
    /// Builds a value from `name`, truncating to fit the NUL terminator.
    pub fn from_name(name: &str) -> Self {
        let mut buf = [0u8; IFNAMSIZ];
        let bytes = name.as_bytes();
        let len = bytes.len().min(IFNAMSIZ - 1);
        buf[..len].copy_from_slice(&bytes[..len]);
        Self { name: buf }
    }

    /// The name up to the first NUL, or `None` when empty or not UTF-8.
    pub fn name(&self) -> Option<&str> {
        let len = self
            .name
            .iter()
            .position(|b| *b == 0)
            .unwrap_or(IFNAMSIZ);
        if len == 0 {
            return None;
        }
        core::str::from_utf8(&self.name[..len]).ok()
    }
}

/// Value of the socket-cookie -> (uid, tag) mapping table.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct UidTagValue {
    pub uid: u32,
    pub tag: u32,
}

// When compiled for userspace with the `user` feature enabled the crate
// exposes an implementation of `aya::Pod` for these types so they can be
// used with aya's typed map APIs.
#[cfg(feature = "user")]
mod user_impls {
    extern crate aya;

    use super::{IfaceValue, StatsKey, StatsValue, UidTagValue};
    use aya::Pod;

    unsafe impl Pod for StatsKey {}
    unsafe impl Pod for StatsValue {}
    unsafe impl Pod for IfaceValue {}
    unsafe impl Pod for UidTagValue {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iface_name_round_trips_short_names() {
        let value = IfaceValue::from_name("wlan0");
        assert_eq!(value.name(), Some("wlan0"));
    }

    #[test]
    fn iface_name_truncates_to_ifnamsiz() {
        let value = IfaceValue::from_name("averyveryverylongname");
        assert_eq!(value.name(), Some("averyveryverylo"));
    }

    #[test]
    fn empty_or_invalid_names_are_rejected() {
        assert_eq!(IfaceValue::default().name(), None);
        let mut raw = [0u8; IFNAMSIZ];
        raw[0] = 0xff;
        raw[1] = 0xfe;
        assert_eq!(IfaceValue { name: raw }.name(), None);
    }

    #[test]
    fn stats_key_orders_by_uid_then_tag_then_iface() {
        let a = StatsKey { uid: 1, tag: 9, iface_index: 9 };
        let b = StatsKey { uid: 2, tag: 0, iface_index: 0 };
        let c = StatsKey { uid: 2, tag: 0, iface_index: 1 };
        assert!(a < b);
        assert!(b < c);
    }
}
