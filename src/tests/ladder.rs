use crate::auction::increment;

#[test]
fn tier_table() {
    for (current, step) in [
        (0, 250),
        (1, 250),
        (4_999, 250),
        (5_000, 500),
        (9_999, 500),
        (10_000, 1_000),
        (19_999, 1_000),
        (20_000, 2_000),
        (29_999, 2_000),
        (30_000, 3_000),
        (49_999, 3_000),
        (50_000, 5_000),
        (99_999, 5_000),
        (1_000_000, 100_000),
        (5_000_000, 100_000),
    ] {
        assert_eq!(increment(current), step, "current = {current}");
    }
}

#[test]
fn low_tier_is_flat() {
    for current in (0..5_000).step_by(7) {
        assert_eq!(increment(current), 250);
    }
}

#[test]
fn top_proportional_tier_scales_with_each_full_hundred_thousand() {
    assert_eq!(increment(100_000), 10_000);
    assert_eq!(increment(199_999), 10_000);
    assert_eq!(increment(200_000), 20_000);
    assert_eq!(increment(250_000), 20_000);
    assert_eq!(increment(999_999), 90_000);
}

#[test]
fn boundaries_belong_to_the_higher_tier() {
    // half-open on the lower bound: the boundary amount already uses the
    // next tier's step
    for boundary in [5_000, 10_000, 20_000, 30_000, 50_000, 100_000, 1_000_000] {
        assert!(increment(boundary) > increment(boundary - 1));
    }
}
