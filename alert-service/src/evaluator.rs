//! Low-stock decision logic.

use shared::{AlertRecord, FrequencyPolicy};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    NoFire,
    /// Notify and latch the record so later crossings stay quiet.
    FireAndLatch,
    /// Notify on every crossing.
    FireNoLatch,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::NoFire => "no_fire",
            Decision::FireAndLatch => "fire_and_latch",
            Decision::FireNoLatch => "fire_no_latch",
        }
    }
}

/// Decides whether `available_quantity` warrants a notification for `record`.
///
/// Pure: the caller has already matched the record to the event's shop and
/// inventory item.
pub fn evaluate(record: &AlertRecord, available_quantity: i64) -> Decision {
    if available_quantity > i64::from(record.threshold) {
        return Decision::NoFire;
    }

    match record.frequency_policy {
        FrequencyPolicy::FireOnce if record.is_triggered => Decision::NoFire,
        FrequencyPolicy::FireOnce => Decision::FireAndLatch,
        FrequencyPolicy::FireAlways => Decision::FireNoLatch,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn record(threshold: i32, frequency_policy: FrequencyPolicy, is_triggered: bool) -> AlertRecord {
        AlertRecord {
            id: 1,
            shop: "demo.myshopify.com".to_string(),
            inventory_item_ref: "gid://shopify/InventoryItem/1".to_string(),
            threshold,
            frequency_policy,
            is_triggered,
        }
    }

    #[test]
    fn policy_table() {
        use Decision::*;
        use FrequencyPolicy::*;

        let cases = [
            (FireOnce, 6, false, NoFire),
            (FireOnce, 6, true, NoFire),
            (FireOnce, 5, true, NoFire),
            (FireOnce, 5, false, FireAndLatch),
            (FireAlways, 6, false, NoFire),
            (FireAlways, 6, true, NoFire),
            (FireAlways, 5, false, FireNoLatch),
            (FireAlways, 5, true, FireNoLatch),
        ];

        for (policy, quantity, triggered, expected) in cases {
            assert_eq!(
                evaluate(&record(5, policy, triggered), quantity),
                expected,
                "{policy} qty={quantity} triggered={triggered}"
            );
        }
    }

    #[test]
    fn zero_threshold_fires_at_zero() {
        let r = record(0, FrequencyPolicy::FireOnce, false);
        assert_eq!(evaluate(&r, 0), Decision::FireAndLatch);
        assert_eq!(evaluate(&r, 1), Decision::NoFire);
    }

    #[test]
    fn oversold_stock_fires() {
        let r = record(0, FrequencyPolicy::FireAlways, false);
        assert_eq!(evaluate(&r, -12), Decision::FireNoLatch);
    }

    proptest! {
        #[test]
        fn fires_iff_at_or_below_threshold(
            threshold in 0..i32::MAX,
            quantity in any::<i64>(),
            always in any::<bool>(),
        ) {
            let policy = if always { FrequencyPolicy::FireAlways } else { FrequencyPolicy::FireOnce };
            let decision = evaluate(&record(threshold, policy, false), quantity);
            prop_assert_eq!(decision != Decision::NoFire, quantity <= i64::from(threshold));
        }

        #[test]
        fn latched_once_records_never_fire(threshold in 0..i32::MAX, quantity in any::<i64>()) {
            let decision = evaluate(&record(threshold, FrequencyPolicy::FireOnce, true), quantity);
            prop_assert_eq!(decision, Decision::NoFire);
        }
    }
}
