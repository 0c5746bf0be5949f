use netstats_common::IfaceValue;

use crate::store::KeyedStore;

/// Maps a kernel interface index to its current name.
///
/// `None` is routine: the interface may have been torn down or renamed after
/// the probe recorded traffic against it.
pub trait InterfaceResolver {
    fn resolve(&self, iface_index: u32) -> Option<String>;
}

/// Any ifindex -> name table resolves by point lookup. Transport failures
/// are folded into `None`; a single row never fails a whole query.
impl<S> InterfaceResolver for S
where
    S: KeyedStore<Key = u32, Value = IfaceValue> + ?Sized,
{
    fn resolve(&self, iface_index: u32) -> Option<String> {
        match self.read(&iface_index) {
            Ok(Some(value)) => value.name().map(str::to_string),
            Ok(None) => None,
            Err(err) => {
                log::debug!("ifindex {iface_index} lookup failed: {err}");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn resolves_registered_names() {
        let names: MemoryStore<u32, IfaceValue> =
            [(5, IfaceValue::from_name("wlan0"))].into_iter().collect();
        assert_eq!(names.resolve(5).as_deref(), Some("wlan0"));
        assert_eq!(names.resolve(5), names.resolve(5));
    }

    #[test]
    fn missing_or_unreadable_entries_resolve_to_none() {
        let names: MemoryStore<u32, IfaceValue> = MemoryStore::new();
        names.insert(1, IfaceValue::default());
        assert_eq!(names.resolve(1), None);
        assert_eq!(names.resolve(2), None);
        names.set_unavailable(true);
        assert_eq!(names.resolve(1), None);
    }
}
