use std::{ffi::CString, sync::Arc};

use netstats_common::{IfaceValue, StatsKey, StatsValue, UidTagValue};

use crate::{
    aggregate::{self, Total},
    bpf::PinnedMap,
    config::{Config, MapPaths},
    error::StatsError,
    model::CounterValue,
    parse::{self, ParsedStats},
    policy::{ForegroundOwners, TrafficSetPolicy},
    reconcile::{self, ReconcileReport},
    store::{KeyedStore, KeyedStoreWrite},
    unknown_iface::{AlertSink, DEFAULT_ALERT_THRESHOLD_BYTES, LogAlertSink, UnknownInterfaceTracker},
};

pub type DetailTable = dyn KeyedStore<Key = StatsKey, Value = StatsValue> + Send + Sync;
pub type DeviceTable = dyn KeyedStore<Key = u32, Value = StatsValue> + Send + Sync;
pub type IfaceNameTable = dyn KeyedStoreWrite<Key = u32, Value = IfaceValue> + Send + Sync;
pub type CookieTagTable = dyn KeyedStore<Key = u64, Value = UidTagValue> + Send + Sync;

/// Handles to the four kernel tables.
#[derive(Clone)]
pub struct StatsTables {
    pub detail: Arc<DetailTable>,
    pub device: Arc<DeviceTable>,
    pub iface_names: Arc<IfaceNameTable>,
    pub cookie_tags: Arc<CookieTagTable>,
}

impl StatsTables {
    /// Opens the pinned maps named in `paths`.
    pub fn open_pinned(paths: &MapPaths) -> Result<Self, StatsError> {
        let detail = PinnedMap::<StatsKey, StatsValue>::open(&paths.detail)
            .map_err(StatsError::unavailable("detail"))?;
        let device = PinnedMap::<u32, StatsValue>::open(&paths.device)
            .map_err(StatsError::unavailable("device"))?;
        let iface_names = PinnedMap::<u32, IfaceValue>::open(&paths.iface_names)
            .map_err(StatsError::unavailable("iface names"))?;
        let cookie_tags = PinnedMap::<u64, UidTagValue>::open(&paths.cookie_tags)
            .map_err(StatsError::unavailable("cookie tag"))?;
        Ok(Self {
            detail: Arc::new(detail),
            device: Arc::new(device),
            iface_names: Arc::new(iface_names),
            cookie_tags: Arc::new(cookie_tags),
        })
    }
}

/// Query surface over the kernel tables.
///
/// Every parse starts a fresh unknown-interface tracking context unless the
/// caller supplies one through the `*_with` variants.
pub struct NetworkStats {
    tables: StatsTables,
    policy: Arc<dyn TrafficSetPolicy>,
    sink: Arc<dyn AlertSink>,
    alert_threshold: i64,
}

impl NetworkStats {
    pub fn new(tables: StatsTables) -> Self {
        Self {
            tables,
            policy: Arc::new(ForegroundOwners::default()),
            sink: Arc::new(LogAlertSink),
            alert_threshold: DEFAULT_ALERT_THRESHOLD_BYTES,
        }
    }

    pub fn from_config(tables: StatsTables, cfg: &Config) -> Self {
        Self::new(tables)
            .with_policy(Arc::new(ForegroundOwners::new(
                cfg.foreground_owners.iter().copied(),
            )))
            .with_alert_threshold(cfg.unknown_iface_alert_bytes)
    }

    pub fn with_policy(mut self, policy: Arc<dyn TrafficSetPolicy>) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_alert_sink(mut self, sink: Arc<dyn AlertSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_alert_threshold(mut self, bytes: i64) -> Self {
        self.alert_threshold = bytes;
        self
    }

    pub fn new_tracker(&self) -> UnknownInterfaceTracker {
        UnknownInterfaceTracker::new(self.alert_threshold, self.sink.clone())
    }

    pub fn parse_detail(&self) -> Result<ParsedStats, StatsError> {
        self.parse_detail_with(&mut self.new_tracker())
    }

    pub fn parse_detail_with(
        &self,
        tracker: &mut UnknownInterfaceTracker,
    ) -> Result<ParsedStats, StatsError> {
        parse::parse_detail(
            &*self.tables.detail,
            &*self.tables.iface_names,
            &*self.policy,
            tracker,
        )
    }

    pub fn parse_device(&self) -> Result<ParsedStats, StatsError> {
        self.parse_device_with(&mut self.new_tracker())
    }

    pub fn parse_device_with(
        &self,
        tracker: &mut UnknownInterfaceTracker,
    ) -> Result<ParsedStats, StatsError> {
        parse::parse_device(&*self.tables.device, &*self.tables.iface_names, tracker)
    }

    pub fn total_for_owner(&self, uid: u32) -> Result<Total, StatsError> {
        aggregate::total_for_owner(&*self.tables.detail, uid)
    }

    pub fn total_for_interface_name(&self, name: &str) -> Result<Total, StatsError> {
        aggregate::total_for_interface_name(&*self.tables.device, &*self.tables.iface_names, name)
    }

    pub fn total_all_interfaces(&self) -> Result<Total, StatsError> {
        aggregate::total_all_interfaces(&*self.tables.device, &*self.tables.iface_names)
    }

    pub fn total_for_interface_index(&self, iface_index: u32) -> Result<CounterValue, StatsError> {
        aggregate::total_for_interface_index(&*self.tables.device, iface_index)
    }

    pub fn clean_tag_map(&self) -> Result<ReconcileReport, StatsError> {
        reconcile::reconcile(&*self.tables.cookie_tags, &*self.tables.detail)
    }

    /// Looks up the kernel index of `name` and records the name so rows on
    /// that index resolve. Returns the index.
    pub fn register_interface(&self, name: &str) -> Result<u32, StatsError> {
        let iface_index =
            if_nametoindex(name).ok_or_else(|| StatsError::UnknownInterface(name.to_string()))?;
        self.register_interface_index(iface_index, name)?;
        Ok(iface_index)
    }

    pub fn register_interface_index(&self, iface_index: u32, name: &str) -> Result<(), StatsError> {
        self.tables
            .iface_names
            .put(iface_index, IfaceValue::from_name(name))
            .map_err(StatsError::unavailable("iface names"))?;
        log::info!("registered {name} as ifindex {iface_index}");
        Ok(())
    }
}

fn if_nametoindex(name: &str) -> Option<u32> {
    let c_name = CString::new(name).ok()?;
    let index = unsafe { libc::if_nametoindex(c_name.as_ptr()) };
    (index != 0).then_some(index)
}
