//! Net decomposition: deciding when a straddling net is worth splitting
//! and choosing the skeleton sinks that make the split sound.
//!
//! A fat net straddling a cutline can be split into two virtual halves
//! routed by the two child tasks, but only after a small sequential
//! "skeleton" routing seeds resources on both sides. The oracle here
//! rejects nets that are too thin, too close to the cutline, or too sparse
//! to give each sampling bin a sink; the sampler picks the most critical
//! sink per bin so the skeleton spans the whole bounding box.

use weft_common::{Axis, Bounds, NetId, Side};

/// Minimum bin size when spatially sampling decomposition sinks. Smaller
/// bins mean more skeleton work on the main task and less speedup, but
/// better quality.
pub const MIN_DECOMP_BIN_WIDTH: usize = 5;

/// Give up decomposing a net after this many decomposition reroutes and
/// route it serially from then on.
pub const MAX_DECOMP_REROUTE: usize = 5;

/// A virtual half of a decomposed net.
///
/// Shares the real net's route tree; its responsibility is limited to the
/// sinks inside `clipped_bb`. Sink membership is a runtime predicate over
/// the box, never a stored list, so virtual nets stay cheap. A virtual net
/// must not outlive the iteration that created it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VirtualNet {
    /// The real net this is a view of.
    pub net: NetId,
    /// The parent bounding box clipped to one side of the cutline.
    pub clipped_bb: Bounds,
    /// Which side of the cutline this half covers.
    pub side: Side,
}

/// Number of levels of decomposition that saturate `num_workers` threads.
pub(crate) fn decomposition_depth(num_workers: usize) -> usize {
    num_workers.next_power_of_two().trailing_zeros() as usize
}

/// Sampling-bin layout over a net's bounding box.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SampleBins {
    bins_x: usize,
    bins_y: usize,
    bin_width: usize,
    bin_height: usize,
    origin: (i32, i32),
}

impl SampleBins {
    /// The bin layout for a box, or `None` when the box is narrower than
    /// one minimum-width bin in either direction.
    pub(crate) fn for_bounds(bb: &Bounds) -> Option<SampleBins> {
        let w = bb.width() as usize;
        let h = bb.height() as usize;
        let bins_x = w / MIN_DECOMP_BIN_WIDTH;
        let bins_y = h / MIN_DECOMP_BIN_WIDTH;
        if bins_x == 0 || bins_y == 0 {
            return None;
        }
        Some(SampleBins {
            bins_x,
            bins_y,
            bin_width: w / bins_x + 1,
            bin_height: h / bins_y + 1,
            origin: (bb.xmin, bb.ymin),
        })
    }

    /// Total number of bins.
    pub(crate) fn len(&self) -> usize {
        self.bins_x * self.bins_y
    }

    /// The flat bin index of a coordinate inside the box.
    pub(crate) fn bin_of(&self, x: i32, y: i32) -> usize {
        let bx = (x - self.origin.0) as usize / self.bin_width;
        let by = (y - self.origin.1) as usize / self.bin_height;
        bx * self.bins_y + by
    }
}

/// Would decomposing this net at the cutline yield any parallelism?
pub(crate) fn is_worth_decomposing(
    bb: &Bounds,
    num_terminals: usize,
    cutline_pos: i32,
    axis: Axis,
) -> bool {
    let Some(bins) = SampleBins::for_bounds(bb) else {
        return false;
    };
    let bin_w = bins.bin_width as i32;
    let bin_h = bins.bin_height as i32;

    // The net itself is a thin strip, smaller than a sampling bin.
    if bb.width() < bin_w || bb.height() < bin_h {
        return false;
    }

    // The cutline leaves a thin strip on one side of it.
    match axis {
        Axis::X => {
            if bb.xmax - cutline_pos < bin_w {
                return false;
            }
            if cutline_pos - bb.xmin + 1 < bin_h {
                return false;
            }
        }
        Axis::Y => {
            if bb.ymax - cutline_pos < bin_w {
                return false;
            }
            if cutline_pos - bb.ymin + 1 < bin_h {
                return false;
            }
        }
    }

    // Enough terminals to at least fill the perimeter bins, with one to
    // spare on each side. The floor of 4 covers the bins_x or bins_y <= 2
    // case.
    let n_samples = (2 * (bins.bins_x + bins.bins_y)).saturating_sub(4).max(4);
    if num_terminals <= n_samples + 2 {
        return false;
    }

    true
}

/// Should this net be decomposed at this tree node?
#[allow(clippy::too_many_arguments)]
pub(crate) fn should_decompose_net(
    level: usize,
    num_workers: usize,
    is_global: bool,
    two_stage_clock_routing: bool,
    decomp_retries: usize,
    bb: &Bounds,
    num_terminals: usize,
    cutline_pos: i32,
    axis: Axis,
) -> bool {
    // Deep enough that thread utilization is already saturated.
    if level + 1 > decomposition_depth(num_workers) {
        return false;
    }
    // Clock nets belong to the dedicated two-stage pass.
    if is_global && two_stage_clock_routing {
        return false;
    }
    // This net has burned its decomposition budget; route it serially.
    if decomp_retries >= MAX_DECOMP_REROUTE {
        return false;
    }
    is_worth_decomposing(bb, num_terminals, cutline_pos, axis)
}

/// Spatially samples the skeleton sinks to route before decomposing.
///
/// `remaining_by_criticality` must be sorted most-critical first; the most
/// critical sink of each still-empty bin is taken. Bins already covered by
/// the existing routing (`reached`) are skipped, so the skeleton only fills
/// the gaps.
pub(crate) fn choose_skeleton_sinks(
    bb: &Bounds,
    reached: impl Iterator<Item = (i32, i32)>,
    remaining_by_criticality: &[(usize, (i32, i32))],
) -> Vec<usize> {
    let mut out = Vec::new();
    let Some(bins) = SampleBins::for_bounds(bb) else {
        return out;
    };

    let mut taken = vec![false; bins.len()];
    let mut to_find = bins.len();

    for (x, y) in reached {
        if to_find == 0 {
            return out;
        }
        let b = bins.bin_of(x, y);
        if !taken[b] {
            taken[b] = true;
            to_find -= 1;
        }
    }

    for &(isink, (x, y)) in remaining_by_criticality {
        if to_find == 0 {
            break;
        }
        let b = bins.bin_of(x, y);
        if !taken[b] {
            taken[b] = true;
            to_find -= 1;
            out.push(isink);
        }
    }

    out
}

/// Splits a net's bounding box into its two virtual halves at a cutline.
/// The first half is always the lower-coordinate side.
pub(crate) fn make_decomposed_pair(
    net: NetId,
    bb: &Bounds,
    cutline_pos: i32,
    axis: Axis,
) -> (VirtualNet, VirtualNet) {
    let low = VirtualNet {
        net,
        clipped_bb: bb.clipped_to_side(axis, cutline_pos, Side::Low),
        side: Side::Low,
    };
    let high = VirtualNet {
        net,
        clipped_bb: bb.clipped_to_side(axis, cutline_pos, Side::High),
        side: Side::High,
    };
    (low, high)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::collections::HashSet;

    #[test]
    fn depth_saturates_at_log2_workers() {
        assert_eq!(decomposition_depth(1), 0);
        assert_eq!(decomposition_depth(2), 1);
        assert_eq!(decomposition_depth(4), 2);
        assert_eq!(decomposition_depth(5), 3);
        assert_eq!(decomposition_depth(8), 3);
    }

    #[test]
    fn thin_nets_are_not_worth_decomposing() {
        // Narrower than one minimum-width bin in y.
        let bb = Bounds::new(0, 0, 29, 3);
        assert!(!is_worth_decomposing(&bb, 100, 15, Axis::X));
        // And in x.
        let bb = Bounds::new(0, 0, 3, 29);
        assert!(!is_worth_decomposing(&bb, 100, 15, Axis::Y));
    }

    #[test]
    fn cutline_near_edge_is_rejected() {
        let bb = Bounds::new(0, 0, 29, 29);
        // Plenty of terminals, but the cut leaves a sliver on the high
        // side.
        assert!(!is_worth_decomposing(&bb, 100, 28, Axis::X));
        assert!(!is_worth_decomposing(&bb, 100, 0, Axis::X));
        assert!(is_worth_decomposing(&bb, 100, 15, Axis::X));
    }

    #[test]
    fn sparse_nets_are_rejected() {
        let bb = Bounds::new(0, 0, 29, 29);
        // bins = 6x6, n_samples = max(2*(6+6)-4, 4) = 20; need > 22
        // terminals.
        assert!(!is_worth_decomposing(&bb, 22, 15, Axis::X));
        assert!(is_worth_decomposing(&bb, 23, 15, Axis::X));
    }

    #[test]
    fn oracle_gates_on_level_and_flags() {
        let bb = Bounds::new(0, 0, 29, 29);
        let ok = |level, workers, global, two_stage, retries| {
            should_decompose_net(level, workers, global, two_stage, retries, &bb, 100, 15, Axis::X)
        };
        assert!(ok(0, 4, false, false, 0));
        assert!(ok(1, 4, false, false, 0));
        // Too deep for the worker count.
        assert!(!ok(2, 4, false, false, 0));
        assert!(!ok(0, 1, false, false, 0));
        // Clock net under two-stage clock routing.
        assert!(!ok(0, 4, true, true, 0));
        assert!(ok(0, 4, true, false, 0));
        // Decomposition budget burned.
        assert!(!ok(0, 4, false, false, MAX_DECOMP_REROUTE));
    }

    #[test]
    fn sampler_covers_each_bin_once() {
        let bb = Bounds::new(0, 0, 19, 19);
        let bins = SampleBins::for_bounds(&bb).unwrap();
        // 4x4 bins of width 6.
        assert_eq!(bins.len(), 16);

        // One candidate sink per location on a diagonal sweep.
        let remaining: Vec<(usize, (i32, i32))> =
            (0..20).map(|i| (i as usize, (i, i))).collect();
        let picked = choose_skeleton_sinks(&bb, std::iter::empty(), &remaining);

        assert!(picked.len() <= bins.len());
        let mut seen = HashSet::new();
        for &isink in &picked {
            let (x, y) = remaining[isink].1;
            assert!(seen.insert(bins.bin_of(x, y)), "one sample per bin");
        }
    }

    #[test]
    fn sampler_skips_reached_bins() {
        let bb = Bounds::new(0, 0, 19, 19);
        let bins = SampleBins::for_bounds(&bb).unwrap();
        let reached = vec![(0, 0), (18, 18)];
        let reached_bins: HashSet<usize> =
            reached.iter().map(|&(x, y)| bins.bin_of(x, y)).collect();

        let remaining: Vec<(usize, (i32, i32))> = (0..20_i32)
            .flat_map(|x| (0..20_i32).map(move |y| (x, y)))
            .enumerate()
            .map(|(i, c)| (i, c))
            .collect();
        let picked = choose_skeleton_sinks(&bb, reached.iter().copied(), &remaining);

        for &isink in &picked {
            let (x, y) = remaining[isink].1;
            assert!(
                !reached_bins.contains(&bins.bin_of(x, y)),
                "sampled bins differ from reached bins"
            );
        }
        // Every other bin got a sample: the grid of candidates is dense.
        assert_eq!(picked.len(), bins.len() - reached_bins.len());
    }

    #[test]
    fn sampler_prefers_most_critical_per_bin() {
        let bb = Bounds::new(0, 0, 9, 4);
        // Single bin row: width 10 -> 2 bins, height 5 -> 1 bin.
        let remaining = vec![
            (7, (1, 1)), // most critical, bin 0
            (3, (2, 2)), // same bin, less critical
            (9, (8, 1)), // bin 1
        ];
        let picked = choose_skeleton_sinks(&bb, std::iter::empty(), &remaining);
        assert_eq!(picked, vec![7, 9]);
    }

    #[test]
    fn sampler_respects_selection_order() {
        let mut rng = StdRng::seed_from_u64(42);
        let bb = Bounds::new(0, 0, 24, 24);
        let remaining: Vec<(usize, (i32, i32))> = (0..40)
            .map(|i| (i as usize, (rng.gen_range(0..25), rng.gen_range(0..25))))
            .collect();
        let picked = choose_skeleton_sinks(&bb, std::iter::empty(), &remaining);
        // Selection order follows criticality order.
        let positions: Vec<usize> = picked
            .iter()
            .map(|&s| remaining.iter().position(|&(i, _)| i == s).unwrap())
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn decomposed_pair_tiles_parent_bb() {
        let net = NetId::from_raw(7);
        let bb = Bounds::new(2, 1, 17, 12);
        let (low, high) = make_decomposed_pair(net, &bb, 9, Axis::X);
        assert_eq!(low.side, Side::Low);
        assert_eq!(high.side, Side::High);
        assert_eq!(low.clipped_bb.xmax + 1, high.clipped_bb.xmin);
        assert_eq!(low.clipped_bb.union(&high.clipped_bb), bb);
        assert_eq!(low.net, net);
        assert_eq!(high.net, net);
    }
}
