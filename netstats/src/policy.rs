use std::collections::BTreeSet;

use netstats_common::StatsKey;

use crate::model::TrafficSet;

/// Decides which traffic set a detail row belongs to.
///
/// The detail key does not carry the set, so the assignment is supplied by
/// configuration rather than inferred from tag values.
pub trait TrafficSetPolicy: Send + Sync {
    fn traffic_set(&self, key: &StatsKey) -> TrafficSet;
}

/// Owners listed as foreground get [`TrafficSet::Foreground`]; every other
/// row is [`TrafficSet::Default`].
#[derive(Clone, Debug, Default)]
pub struct ForegroundOwners {
    owners: BTreeSet<u32>,
}

impl ForegroundOwners {
    pub fn new<I: IntoIterator<Item = u32>>(owners: I) -> Self {
        Self {
            owners: owners.into_iter().collect(),
        }
    }
}

impl TrafficSetPolicy for ForegroundOwners {
    fn traffic_set(&self, key: &StatsKey) -> TrafficSet {
        if self.owners.contains(&key.uid) {
            TrafficSet::Foreground
        } else {
            TrafficSet::Default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_policy_maps_everything_to_default() {
        let policy = ForegroundOwners::default();
        let key = StatsKey { uid: 10, tag: 7, iface_index: 1 };
        assert_eq!(policy.traffic_set(&key), TrafficSet::Default);
    }

    #[test]
    fn listed_owners_are_foreground_regardless_of_tag() {
        let policy = ForegroundOwners::new([10]);
        for tag in [0, 7] {
            let key = StatsKey { uid: 10, tag, iface_index: 1 };
            assert_eq!(policy.traffic_set(&key), TrafficSet::Foreground);
        }
        let other = StatsKey { uid: 11, tag: 0, iface_index: 1 };
        assert_eq!(policy.traffic_set(&other), TrafficSet::Default);
    }
}
