//! Overuse-trend prediction of the routing outcome.
//!
//! Tracks the overused-node count of each iteration and extrapolates the
//! recent trend to estimate at which iteration the routing will first be
//! legal. The controller compares the estimate against an abort threshold
//! to give up early on designs that will clearly not converge.

/// Iterations of history the linear fit looks at.
const PREDICTOR_WINDOW: usize = 5;

/// Predicts the first legal routing iteration from overuse history.
#[derive(Debug, Default)]
pub struct RoutingPredictor {
    history: Vec<(usize, usize)>,
}

impl RoutingPredictor {
    /// Creates a predictor with no history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the overused-node count of a finished iteration.
    pub fn add_iteration_overuse(&mut self, itry: usize, overused_nodes: usize) {
        self.history.push((itry, overused_nodes));
    }

    /// Estimates the iteration at which overuse reaches zero by fitting a
    /// line through the recent history. Returns `NaN` while there is too
    /// little history or the trend is not downward.
    pub fn estimate_success_iteration(&self) -> f32 {
        if self.history.len() < 2 {
            return f32::NAN;
        }
        let window = &self.history[self.history.len().saturating_sub(PREDICTOR_WINDOW)..];
        let n = window.len() as f32;
        let mean_x = window.iter().map(|&(i, _)| i as f32).sum::<f32>() / n;
        let mean_y = window.iter().map(|&(_, o)| o as f32).sum::<f32>() / n;
        let mut cov = 0.0;
        let mut var = 0.0;
        for &(i, o) in window {
            let dx = i as f32 - mean_x;
            cov += dx * (o as f32 - mean_y);
            var += dx * dx;
        }
        if var == 0.0 {
            return f32::NAN;
        }
        let slope = cov / var;
        if slope >= 0.0 {
            return f32::NAN;
        }
        // The fitted line crosses zero overuse at this iteration.
        mean_x - mean_y / slope
    }
}
