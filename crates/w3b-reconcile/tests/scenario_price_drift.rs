use w3b_reconcile::{price_decision, PriceDecision, PricePolicy, PriceRejection};

#[test]
fn half_percent_drift_is_skipped() {
    let d = price_decision(1_000, 1_005, PricePolicy::default());
    assert_eq!(d, PriceDecision::Skip { drift_bps: 50 });
}

#[test]
fn five_percent_drift_is_published() {
    let d = price_decision(1_000, 1_050, PricePolicy::default());
    assert_eq!(
        d,
        PriceDecision::Publish {
            price: 1_050,
            drift_bps: 500,
            clamped: false
        }
    );
}

#[test]
fn drift_exactly_at_threshold_publishes() {
    let d = price_decision(1_000, 990, PricePolicy::default());
    assert!(matches!(d, PriceDecision::Publish { price: 990, .. }));
}

#[test]
fn drift_beyond_step_bound_is_clamped_toward_candidate() {
    let up = price_decision(1_000, 2_000, PricePolicy::default());
    assert_eq!(
        up,
        PriceDecision::Publish {
            price: 1_200,
            drift_bps: 10_000,
            clamped: true
        }
    );

    let down = price_decision(1_000, 100, PricePolicy::default());
    assert!(matches!(
        down,
        PriceDecision::Publish {
            price: 800,
            clamped: true,
            ..
        }
    ));
}

#[test]
fn zero_candidate_is_rejected() {
    assert_eq!(
        price_decision(1_000, 0, PricePolicy::default()),
        PriceDecision::Reject {
            reason: PriceRejection::ZeroCandidate
        }
    );
}

#[test]
fn unset_on_chain_price_always_publishes() {
    let d = price_decision(0, 5, PricePolicy::default());
    assert!(matches!(
        d,
        PriceDecision::Publish {
            price: 5,
            clamped: false,
            ..
        }
    ));
}

#[test]
fn custom_threshold_is_respected() {
    let policy = PricePolicy {
        drift_threshold_bps: 25,
        max_step_bps: 2_000,
    };
    assert!(matches!(
        price_decision(1_000, 1_005, policy),
        PriceDecision::Publish { .. }
    ));
}

#[test]
fn huge_prices_do_not_overflow() {
    let d = price_decision(u64::MAX, u64::MAX - 1, PricePolicy::default());
    assert!(matches!(d, PriceDecision::Skip { drift_bps: 0 }));
}
