//! Resource functions: map the aggregate load of an SF to the node capacity it consumes.
//!
//! Functions are declared in YAML, one file per named function, for example
//!
//! ```yaml
//! kind: polynomial
//! coefficients: [0.0, 1.0, 0.05]
//! ```

use serde::{Deserialize, Serialize};

/// A monotone non-decreasing `load -> capacity units` map.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResourceFunction {
    /// `f(x) = x`
    #[default]
    Identity,
    /// `f(x) = slope * x + intercept`
    Linear {
        slope: f64,
        #[serde(default)]
        intercept: f64,
    },
    /// `f(x) = c0 + c1 x + c2 x^2 + ...`
    Polynomial { coefficients: Vec<f64> },
    /// Linear interpolation between `(load, capacity)` points sorted by load.
    /// Below the first point the first value is used; beyond the last point the
    /// last segment is extended.
    PiecewiseLinear { points: Vec<(f64, f64)> },
    /// `f(x)` is the capacity of the last `(threshold, capacity)` step with `threshold <= x`,
    /// or 0 below the first threshold.
    Step { steps: Vec<(f64, f64)> },
}

impl ResourceFunction {
    pub fn eval(&self, load: f64) -> f64 {
        match self {
            ResourceFunction::Identity => load,
            ResourceFunction::Linear { slope, intercept } => slope * load + intercept,
            ResourceFunction::Polynomial { coefficients } => coefficients
                .iter()
                .rev()
                .fold(0.0, |acc, c| acc * load + c),
            ResourceFunction::PiecewiseLinear { points } => piecewise(points, load),
            ResourceFunction::Step { steps } => steps
                .iter()
                .take_while(|(threshold, _)| *threshold <= load)
                .last()
                .map(|(_, cap)| *cap)
                .unwrap_or(0.0),
        }
    }

    /// Checks shape constraints and monotonicity on a sample of loads in `[0, max_load]`.
    pub fn validate(&self, max_load: f64) -> Result<(), String> {
        match self {
            ResourceFunction::Linear { slope, .. } if *slope < 0.0 => {
                return Err(format!("negative slope {slope}"));
            }
            ResourceFunction::Polynomial { coefficients } if coefficients.is_empty() => {
                return Err("polynomial without coefficients".to_string());
            }
            ResourceFunction::PiecewiseLinear { points } => {
                if points.is_empty() {
                    return Err("piecewise function without points".to_string());
                }
                if points.windows(2).any(|w| w[1].0 <= w[0].0) {
                    return Err("piecewise points must be strictly increasing in load".to_string());
                }
            }
            ResourceFunction::Step { steps } => {
                if steps.windows(2).any(|w| w[1].0 <= w[0].0) {
                    return Err("step thresholds must be strictly increasing".to_string());
                }
            }
            _ => {}
        }

        const SAMPLES: usize = 256;
        let max_load = if max_load.is_finite() && max_load > 0.0 {
            max_load
        } else {
            1.0
        };
        let mut prev = self.eval(0.0);
        if !prev.is_finite() {
            return Err("f(0) is not finite".to_string());
        }
        for i in 1..=SAMPLES {
            let x = max_load * i as f64 / SAMPLES as f64;
            let y = self.eval(x);
            if !y.is_finite() {
                return Err(format!("f({x}) is not finite"));
            }
            if y + 1e-12 < prev {
                return Err(format!("not monotone non-decreasing at load {x}"));
            }
            prev = y;
        }
        Ok(())
    }
}

fn piecewise(points: &[(f64, f64)], load: f64) -> f64 {
    match points {
        [] => load,
        [(_, y)] => *y,
        _ => {
            if load <= points[0].0 {
                return points[0].1;
            }
            let seg = points
                .windows(2)
                .find(|w| load <= w[1].0)
                .unwrap_or(&points[points.len() - 2..]);
            let (x0, y0) = seg[0];
            let (x1, y1) = seg[1];
            y0 + (y1 - y0) * (load - x0) / (x1 - x0)
        }
    }
}
