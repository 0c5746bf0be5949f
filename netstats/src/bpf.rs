use std::{
    convert::TryFrom,
    path::{Path, PathBuf},
    sync::{Mutex, MutexGuard},
};

use aya::{
    Pod,
    maps::{HashMap, Map, MapData, MapError, MapType},
};

use crate::{
    error::{RowError, StoreError},
    store::{DeleteOutcome, KeyedStore, KeyedStoreWrite, RowIter},
};

pub const DEFAULT_STATS_MAP_PIN: &str = "/sys/fs/bpf/netstats/map_stats";
pub const DEFAULT_IFACE_STATS_MAP_PIN: &str = "/sys/fs/bpf/netstats/map_iface_stats";
pub const DEFAULT_IFACE_INDEX_NAME_MAP_PIN: &str = "/sys/fs/bpf/netstats/map_iface_index_name";
pub const DEFAULT_COOKIE_TAG_MAP_PIN: &str = "/sys/fs/bpf/netstats/map_cookie_tag";

/// A BPF hash map pinned on bpffs, opened through aya.
///
/// Deletes and writes need a mutable handle, so the map sits behind a mutex.
/// Enumeration collects under the lock and hands back an owned iterator.
pub struct PinnedMap<K, V> {
    path: PathBuf,
    map: Mutex<HashMap<MapData, K, V>>,
}

impl<K: Pod, V: Pod> PinnedMap<K, V> {
    pub fn open<P: AsRef<Path>>(pin_path: P) -> Result<Self, StoreError> {
        let path = pin_path.as_ref().to_path_buf();
        let map_data = MapData::from_pin(&path).map_err(|e| {
            StoreError::Unavailable(format!("failed to open pinned map {}: {e}", path.display()))
        })?;
        let map_enum = map_from_data(map_data)
            .map_err(|e| StoreError::Unavailable(format!("invalid map type: {e}")))?;
        let map = HashMap::<_, K, V>::try_from(map_enum).map_err(|e| {
            StoreError::Unavailable(format!(
                "{} is not a hash map of the expected shape: {e}",
                path.display()
            ))
        })?;
        Ok(Self {
            path,
            map: Mutex::new(map),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<MapData, K, V>>, StoreError> {
        self.map
            .lock()
            .map_err(|_| StoreError::Unavailable(format!("{} handle poisoned", self.path.display())))
    }
}

/// Equivalent of `Map::from_map_data` from newer aya releases, which 0.13.1
/// lacks: wraps the map data in the variant matching its kernel map type.
fn map_from_data(map_data: MapData) -> Result<Map, MapError> {
    let map_type = map_data.info()?.map_type()?;
    Ok(match map_type {
        MapType::Hash => Map::HashMap(map_data),
        MapType::LruHash => Map::LruHashMap(map_data),
        _ => Map::Unsupported(map_data),
    })
}

fn is_enoent(err: &MapError) -> bool {
    match err {
        MapError::KeyNotFound => true,
        MapError::SyscallError(err) => err.io_error.raw_os_error() == Some(libc::ENOENT),
        _ => false,
    }
}

fn op_error(op: &'static str, err: MapError) -> StoreError {
    StoreError::Operation {
        op,
        reason: err.to_string(),
    }
}

impl<K: Pod + 'static, V: Pod + 'static> KeyedStore for PinnedMap<K, V> {
    type Key = K;
    type Value = V;

    fn read(&self, key: &K) -> Result<Option<V>, StoreError> {
        match self.lock()?.get(key, 0) {
            Ok(value) => Ok(Some(value)),
            Err(err) if is_enoent(&err) => Ok(None),
            Err(err) => Err(op_error("bpf_map_lookup_elem", err)),
        }
    }

    fn iterate(&self) -> Result<RowIter<'_, K, V>, StoreError> {
        let map = self.lock()?;
        let mut rows = Vec::new();
        let mut iter = map.iter().peekable();
        // A failure on the very first key means the table cannot be walked at all.
        if let Some(Err(err)) = iter.peek() {
            if !is_enoent(err) {
                return Err(StoreError::Unavailable(format!(
                    "failed to enumerate {}: {err}",
                    self.path.display()
                )));
            }
        }
        for item in iter {
            match item {
                Ok(row) => rows.push(Ok(row)),
                Err(err) if is_enoent(&err) => {}
                Err(err) => rows.push(Err(RowError::Malformed(err.to_string()))),
            }
        }
        Ok(Box::new(rows.into_iter()))
    }

    fn delete(&self, key: &K) -> Result<DeleteOutcome, StoreError> {
        match self.lock()?.remove(key) {
            Ok(()) => Ok(DeleteOutcome::Deleted),
            Err(err) if is_enoent(&err) => Ok(DeleteOutcome::AlreadyAbsent),
            Err(err) => Err(op_error("bpf_map_delete_elem", err)),
        }
    }
}

impl<K: Pod + 'static, V: Pod + 'static> KeyedStoreWrite for PinnedMap<K, V> {
    fn put(&self, key: K, value: V) -> Result<(), StoreError> {
        self.lock()?
            .insert(key, value, 0)
            .map_err(|err| op_error("bpf_map_update_elem", err))
    }
}
