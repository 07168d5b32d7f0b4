//! Math helpers shared by the unit, module and report code.

/// CALM unit transfer: decay the committed activation, then squash the
/// net input into the remaining headroom.
///
/// Excitation saturates toward 1, inhibition decays toward 0. The two
/// branches use different denominators so the result stays in `[0, 1]`
/// whenever `current` does.
#[inline]
pub fn saturating_update(current: f32, input: f32, k_a: f32) -> f32 {
    let decay = (1.0 - k_a) * current;
    if input >= 0.0 {
        decay + (input / (1.0 + input)) * (1.0 - decay)
    } else {
        decay + (input / (1.0 - input)) * decay
    }
}

/// Gaussian-shaped learning rate driven by the E-unit, floored at zero:
/// `max(D_L + WMUE_L * (1 - (e - G_L)^2 / G_W), 0)`.
#[inline]
pub fn gaussian_learning_rate(e: f32, d_l: f32, wmue_l: f32, g_l: f32, g_w: f32) -> f32 {
    let dev = e - g_l;
    (d_l + wmue_l * (1.0 - dev * dev / g_w)).max(0.0)
}

/// Kernel width for a ring of `n` map units.
#[inline]
pub fn map_sigma(n: usize) -> f32 {
    let n = n as f32;
    (-4.0 / n) * ((0.01 + (-0.25 * n).exp()) / (n + 1.0)).ln()
}

/// Distance between two positions on a ring of `n` units.
#[inline]
pub fn ring_distance(i: usize, j: usize, n: usize) -> usize {
    let d = i.abs_diff(j);
    d.min(n - d)
}

/// Number of distinct winning nodes in a winner column.
pub fn distinct_winners(winners: &[Option<usize>]) -> usize {
    let mut seen: Vec<usize> = winners.iter().flatten().copied().collect();
    seen.sort_unstable();
    seen.dedup();
    seen.len()
}

/// Whether successive winners step around the ring in one direction.
///
/// Jumps between the smallest and largest index count as wrap-around and
/// are ignored, as are repeats and patterns without a winner.
pub fn ring_ordered(winners: &[Option<usize>]) -> bool {
    let seq: Vec<usize> = winners.iter().flatten().copied().collect();
    let (Some(&lo), Some(&hi)) = (seq.iter().min(), seq.iter().max()) else {
        return true;
    };
    let mut direction = 0i8;
    for pair in seq.windows(2) {
        let (a, b) = (pair[0], pair[1]);
        if (a == hi && b == lo) || (a == lo && b == hi) {
            continue;
        }
        let step = match b.cmp(&a) {
            std::cmp::Ordering::Greater => 1,
            std::cmp::Ordering::Less => -1,
            std::cmp::Ordering::Equal => continue,
        };
        if direction == 0 {
            direction = step;
        } else if direction != step {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_saturating_update_branches() {
        // from rest, excitation x gives x / (1 + x)
        assert_abs_diff_eq!(saturating_update(0.0, 1.0, 0.05), 0.5, epsilon = 1e-6);
        // inhibition decays toward zero
        let a = saturating_update(0.5, -1.0, 0.05);
        let decay = 0.95 * 0.5;
        assert_abs_diff_eq!(a, decay - 0.5 * decay, epsilon = 1e-6);
        // no input: plain decay
        assert_abs_diff_eq!(saturating_update(0.8, 0.0, 0.05), 0.76, epsilon = 1e-6);
    }

    #[test]
    fn test_saturating_update_bounded() {
        for &x in &[-1000.0, -3.0, -0.1, 0.0, 0.1, 3.0, 1000.0] {
            for &c in &[0.0, 0.3, 1.0] {
                let a = saturating_update(c, x, 0.05);
                assert!((0.0..=1.0).contains(&a), "x={x} c={c} -> {a}");
            }
        }
    }

    #[test]
    fn test_learning_rate_peak_and_floor() {
        let peak = gaussian_learning_rate(0.6, 0.005, 0.05, 0.6, 0.05);
        assert_abs_diff_eq!(peak, 0.055, epsilon = 1e-6);
        assert_eq!(gaussian_learning_rate(0.0, 0.005, 0.05, 0.6, 0.05), 0.0);
    }

    #[test]
    fn test_ring_distance() {
        assert_eq!(ring_distance(0, 0, 8), 0);
        assert_eq!(ring_distance(0, 7, 8), 1);
        assert_eq!(ring_distance(2, 6, 8), 4);
        assert_eq!(ring_distance(5, 1, 8), 4);
    }

    #[test]
    fn test_map_sigma_positive() {
        for n in 2..64 {
            assert!(map_sigma(n) > 0.0);
        }
    }

    #[test]
    fn test_distinct_winners() {
        let w = [Some(1), None, Some(1), Some(0), Some(3)];
        assert_eq!(distinct_winners(&w), 3);
        assert_eq!(distinct_winners(&[None, None]), 0);
    }

    #[test]
    fn test_ring_ordered() {
        assert!(ring_ordered(&[Some(0), Some(1), Some(2), Some(3)]));
        assert!(ring_ordered(&[Some(2), Some(3), Some(0), Some(1)]));
        assert!(ring_ordered(&[Some(3), Some(2), Some(2), Some(1)]));
        assert!(!ring_ordered(&[Some(0), Some(2), Some(1), Some(3)]));
        assert!(ring_ordered(&[]));
    }
}
