use rand::Rng;

/// Weighted random choice.
///
/// Zero, negative and non-finite weights are excluded; the rest are clamped to
/// `cap`. Candidates are walked in slice order, so callers that sort by id get
/// id order as the tie-break.
pub fn weighted_pick<'a, T, R: Rng + ?Sized>(
    candidates: &'a [(T, f64)],
    cap: f64,
    rng: &mut R,
) -> Option<&'a T> {
    let weight = |w: f64| {
        if w.is_finite() && w > 0.0 {
            w.min(cap)
        } else {
            0.0
        }
    };
    let total: f64 = candidates.iter().map(|(_, w)| weight(*w)).sum();
    if !total.is_finite() || total <= 0.0 {
        return None;
    }
    let mut roll = rng.gen_range(0.0..total);
    let mut last = None;
    for (item, w) in candidates {
        let w = weight(*w);
        if w <= 0.0 {
            continue;
        }
        if roll < w {
            return Some(item);
        }
        roll -= w;
        last = Some(item);
    }
    // Rounding can leave a sliver of roll past the final candidate.
    last
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn zero_and_negative_weights_are_never_picked() {
        let candidates = [("zero", 0.0), ("negative", -4.0), ("nan", f64::NAN), ("only", 1.0)];
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        for _ in 0..200 {
            assert_eq!(weighted_pick(&candidates, 100.0, &mut rng), Some(&"only"));
        }
    }

    #[test]
    fn empty_or_all_zero_yields_none() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let empty: [(u8, f64); 0] = [];
        assert_eq!(weighted_pick(&empty, 100.0, &mut rng), None);
        assert_eq!(weighted_pick(&[(1u8, 0.0)], 100.0, &mut rng), None);
    }

    #[test]
    fn cap_flattens_runaway_weights() {
        let candidates = [("huge", 1.0e9), ("small", 100.0)];
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let small = (0..2000)
            .filter(|_| weighted_pick(&candidates, 100.0, &mut rng) == Some(&"small"))
            .count();
        // Both clamp to 100, so each wins about half the time.
        assert!((800..1200).contains(&small), "small picked {small} times");
    }

    #[test]
    fn same_seed_same_choice() {
        let candidates: Vec<(u32, f64)> = (0..10).map(|i| (i, f64::from(i + 1))).collect();
        let a = weighted_pick(&candidates, 100.0, &mut ChaCha8Rng::seed_from_u64(5)).copied();
        let b = weighted_pick(&candidates, 100.0, &mut ChaCha8Rng::seed_from_u64(5)).copied();
        assert_eq!(a, b);
    }
}
