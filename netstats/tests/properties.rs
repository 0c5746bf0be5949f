use std::collections::BTreeSet;

use netstats::{
    CounterValue, ReportRecord, TrafficSet, UID_ALL, aggregate, reconcile::reconcile,
    store::MemoryStore,
};
use netstats_common::{StatsKey, StatsValue, UidTagValue};
use proptest::prelude::*;

fn arb_set() -> impl Strategy<Value = TrafficSet> {
    prop_oneof![
        Just(TrafficSet::Default),
        Just(TrafficSet::Foreground),
        Just(TrafficSet::All),
    ]
}

fn arb_record() -> impl Strategy<Value = ReportRecord> {
    (
        prop_oneof![Just("wlan0"), Just("rmnet0"), Just("eth0")],
        0u32..4,
        arb_set(),
        0u32..3,
        (0i64..1 << 40, 0i64..1 << 20, 0i64..1 << 40, 0i64..1 << 20),
    )
        .prop_map(|(iface, uid, set, tag, (rxb, rxp, txb, txp))| {
            ReportRecord::new(iface, uid, set, tag, CounterValue::new(rxb, rxp, txb, txp))
        })
}

fn mass(records: &[ReportRecord]) -> CounterValue {
    records.iter().map(|r| r.counters).sum()
}

// ---------------------------------------------------------------------------
// Property: grouping is idempotent and preserves every counter total
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(300))]

    #[test]
    fn group_is_idempotent(records in proptest::collection::vec(arb_record(), 0..64)) {
        let mut once = records;
        aggregate::group(&mut once);
        let mut twice = once.clone();
        aggregate::group(&mut twice);

        prop_assert_eq!(once.len(), twice.len());
        for (a, b) in once.iter().zip(&twice) {
            prop_assert_eq!(a, b);
            prop_assert_eq!(a.counters, b.counters);
        }
    }

    #[test]
    fn group_preserves_mass(records in proptest::collection::vec(arb_record(), 0..64)) {
        let expected = mass(&records);
        let mut grouped = records;
        aggregate::group(&mut grouped);
        prop_assert_eq!(mass(&grouped), expected);
    }

    #[test]
    fn group_leaves_one_record_per_identity(records in proptest::collection::vec(arb_record(), 0..64)) {
        let distinct: BTreeSet<_> = records
            .iter()
            .map(|r| (r.iface.clone(), r.uid, r.set, r.tag))
            .collect();
        let mut grouped = records;
        aggregate::group(&mut grouped);
        prop_assert_eq!(grouped.len(), distinct.len());
        prop_assert!(grouped.windows(2).all(|w| w[0] < w[1]));
    }
}

// ---------------------------------------------------------------------------
// Property: the all-owner total decomposes into per-owner totals
// ---------------------------------------------------------------------------

fn arb_detail_rows() -> impl Strategy<Value = Vec<(StatsKey, StatsValue)>> {
    proptest::collection::vec(
        (
            0u32..6,
            0u32..4,
            1u32..4,
            (0u64..1 << 40, 0u64..1 << 20, 0u64..1 << 40, 0u64..1 << 20),
        )
            .prop_map(|(uid, tag, iface_index, (rxb, rxp, txb, txp))| {
                (
                    StatsKey { uid, tag, iface_index },
                    StatsValue {
                        rx_bytes: rxb,
                        rx_packets: rxp,
                        tx_bytes: txb,
                        tx_packets: txp,
                    },
                )
            }),
        0..48,
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn all_owner_total_is_sum_of_owner_totals(rows in arb_detail_rows()) {
        let table: MemoryStore<StatsKey, StatsValue> = rows.into_iter().collect();
        let owners: BTreeSet<u32> = (0..6).collect();

        let per_owner: CounterValue = owners
            .iter()
            .map(|uid| aggregate::total_for_owner(&table, *uid).unwrap().counters)
            .sum();
        prop_assert_eq!(aggregate::total_for_owner(&table, UID_ALL).unwrap().counters, per_owner);
    }
}

// ---------------------------------------------------------------------------
// Property: reconcile never drops a live mapping and converges in one pass
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn reconcile_keeps_live_mappings(
        rows in arb_detail_rows(),
        mappings in proptest::collection::btree_map(any::<u64>(), (0u32..6, 0u32..4), 0..32),
    ) {
        let live: BTreeSet<(u32, u32)> = rows.iter().map(|(k, _)| (k.uid, k.tag)).collect();
        let stats: MemoryStore<StatsKey, StatsValue> = rows.into_iter().collect();
        let tags: MemoryStore<u64, UidTagValue> = mappings
            .iter()
            .map(|(cookie, (uid, tag))| (*cookie, UidTagValue { uid: *uid, tag: *tag }))
            .collect();

        let report = reconcile(&tags, &stats).unwrap();
        for (cookie, (uid, tag)) in &mappings {
            prop_assert_eq!(tags.contains_key(cookie), live.contains(&(*uid, *tag)));
        }
        prop_assert_eq!(report.scanned, mappings.len());
        prop_assert_eq!(reconcile(&tags, &stats).unwrap().deleted, 0);
    }
}
