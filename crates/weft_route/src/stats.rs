//! Per-worker routing statistics.

use serde::Serialize;

/// Counters collected by one worker during an iteration and merged by the
/// controller after the partition tree joins.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct RouterStats {
    /// Nets whose routing was (re)built.
    pub nets_routed: usize,
    /// Individual source-to-sink connections completed.
    pub connections_routed: usize,
    /// Nodes pushed onto connection-router heaps.
    pub heap_pushes: usize,
    /// Nodes popped off connection-router heaps.
    pub heap_pops: usize,
}

impl RouterStats {
    /// Folds another worker's counters into this one.
    pub fn merge(&mut self, other: &RouterStats) {
        self.nets_routed += other.nets_routed;
        self.connections_routed += other.connections_routed;
        self.heap_pushes += other.heap_pushes;
        self.heap_pops += other.heap_pops;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_accumulates() {
        let mut a = RouterStats {
            nets_routed: 1,
            connections_routed: 4,
            heap_pushes: 100,
            heap_pops: 80,
        };
        let b = RouterStats {
            nets_routed: 2,
            connections_routed: 3,
            heap_pushes: 50,
            heap_pops: 40,
        };
        a.merge(&b);
        assert_eq!(a.nets_routed, 3);
        assert_eq!(a.connections_routed, 7);
        assert_eq!(a.heap_pushes, 150);
        assert_eq!(a.heap_pops, 120);
    }
}
