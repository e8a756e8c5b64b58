//! Per-iteration route status reporting.

use crate::stats::RouterStats;
use weft_fabric::OveruseInfo;

/// Prints the column header of the route status table.
pub(crate) fn print_route_status_header() {
    eprintln!(
        "{:>4} {:>8} {:>9} {:>5} {:>8} {:>8} {:>10} {:>6} {:>9} {:>8}",
        "Iter", "Time(s)", "pres_fac", "BBs", "Overuse", "Over%", "WL", "WL%", "CPD", "EstSucc"
    );
    eprintln!("{}", "-".repeat(86));
}

/// Formats one status row; printing is split out so the formatting stays
/// testable.
#[allow(clippy::too_many_arguments)]
pub(crate) fn status_row(
    itry: usize,
    elapsed_sec: f32,
    pres_fac: f32,
    bbs_updated: usize,
    _stats: &RouterStats,
    overuse: &OveruseInfo,
    used_wirelength: u64,
    available_wirelength: u64,
    critical_path_delay: Option<f32>,
    est_success_iteration: f32,
) -> String {
    let wl_pct = if available_wirelength == 0 {
        0.0
    } else {
        100.0 * used_wirelength as f32 / available_wirelength as f32
    };
    let cpd = match critical_path_delay {
        Some(d) => format!("{d:9.2}"),
        None => format!("{:>9}", "--"),
    };
    let est = if est_success_iteration.is_finite() {
        format!("{est_success_iteration:8.1}")
    } else {
        format!("{:>8}", "N/A")
    };
    format!(
        "{:>4} {:>8.2} {:>9.2} {:>5} {:>8} {:>7.2}% {:>10} {:>5.1}% {} {}",
        itry,
        elapsed_sec,
        pres_fac,
        bbs_updated,
        overuse.overused_nodes,
        overuse.overused_pct(),
        used_wirelength,
        wl_pct,
        cpd,
        est
    )
}

/// Prints one status row.
#[allow(clippy::too_many_arguments)]
pub(crate) fn print_route_status(
    itry: usize,
    elapsed_sec: f32,
    pres_fac: f32,
    bbs_updated: usize,
    stats: &RouterStats,
    overuse: &OveruseInfo,
    used_wirelength: u64,
    available_wirelength: u64,
    critical_path_delay: Option<f32>,
    est_success_iteration: f32,
) {
    eprintln!(
        "{}",
        status_row(
            itry,
            elapsed_sec,
            pres_fac,
            bbs_updated,
            stats,
            overuse,
            used_wirelength,
            available_wirelength,
            critical_path_delay,
            est_success_iteration,
        )
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_contains_key_figures() {
        let overuse = OveruseInfo {
            overused_nodes: 7,
            total_overuse: 9,
            num_nodes: 100,
        };
        let row = status_row(
            3,
            1.25,
            0.84,
            2,
            &RouterStats::default(),
            &overuse,
            250,
            1000,
            Some(12.5),
            8.4,
        );
        assert!(row.contains('3'));
        assert!(row.contains("0.84"));
        assert!(row.contains('7'));
        assert!(row.contains("25.0%"));
        assert!(row.contains("12.5"));
        assert!(row.contains("8.4"));
    }

    #[test]
    fn row_handles_missing_timing_and_estimate() {
        let overuse = OveruseInfo::default();
        let row = status_row(
            1,
            0.0,
            0.0,
            0,
            &RouterStats::default(),
            &overuse,
            0,
            0,
            None,
            f32::NAN,
        );
        assert!(row.contains("--"));
        assert!(row.contains("N/A"));
    }
}
