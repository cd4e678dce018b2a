//! Column post-processing: imputation, winsorization, standardization.
//!
//! A cell row moves through `joined → imputed → winsorized → standardized`
//! in that order; each step is a pure column transform.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::Peak;

/// Fill nulls with the column mean of the present values. A fully-null
/// column imputes to 0. Returns the dense column and the fill count.
pub fn impute_mean(values: &[Option<f64>]) -> (Vec<f64>, u64) {
    let present: Vec<f64> = values.iter().flatten().copied().collect();
    let mean = if present.is_empty() {
        0.0
    } else {
        present.iter().sum::<f64>() / present.len() as f64
    };
    let mut filled = 0;
    let dense = values
        .iter()
        .map(|v| {
            v.unwrap_or_else(|| {
                filled += 1;
                mean
            })
        })
        .collect();
    (dense, filled)
}

/// Linearly interpolated quantile of a sorted slice, `q ∈ [0, 1]`.
pub fn quantile(sorted: &[f64], q: f64) -> f64 {
    debug_assert!(!sorted.is_empty());
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    sorted[lo] * (1.0 - frac) + sorted[hi] * frac
}

/// Clamp a column to its own `[low, high]` quantiles in place.
pub fn winsorize(values: &mut [f64], low: f64, high: f64) {
    if values.is_empty() {
        return;
    }
    let mut sorted = values.to_vec();
    sorted.sort_unstable_by(|a, b| a.total_cmp(b));
    let lo = quantile(&sorted, low);
    let hi = quantile(&sorted, high);
    for v in values {
        *v = v.clamp(lo, hi);
    }
}

/// Mean and standard deviation used to z-score a column; persisting these
/// makes the transform invertible.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ColumnScale {
    pub mean: f64,
    pub std: f64,
}

impl ColumnScale {
    /// Undo the z-score for one value. A constant column (std 0) inverts
    /// back to its mean.
    pub fn inverse(&self, z: f64) -> f64 {
        z * self.std + self.mean
    }
}

/// z-score a column with the population standard deviation. A constant
/// column standardizes to all zeros and records `std = 0`.
pub fn standardize(values: &[f64]) -> (Vec<f64>, ColumnScale) {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    let std = var.sqrt();
    let scaled = if std > 0.0 {
        values.iter().map(|v| (v - mean) / std).collect()
    } else {
        vec![0.0; values.len()]
    };
    (scaled, ColumnScale { mean, std })
}

/// Sidecar persisted next to the standardized table.
#[derive(Debug, Serialize, Deserialize)]
pub struct StandardizationSidecar {
    pub peak: Peak,
    pub winsorize_low: f64,
    pub winsorize_high: f64,
    pub columns: BTreeMap<String, ColumnScale>,
}
