// 📊 Quantile Categorizer - split a series into q ordered bins
//
// Edges are the linear-interpolation quantiles of the non-missing values at
// probabilities 0, 1/q, ..., 1. Repeated edges (skewed or discrete data) are
// collapsed, which leaves fewer than q bins. Bins are right-closed, and the
// lowest edge itself belongs to the first bin:
//
//   edge[k] < value <= edge[k+1]   →   bin k
//
// Values that are missing or fall outside every edge go to `Unclassified`.

use crate::diagnostics::Diagnostics;
use crate::error::{CategorizeError, Result};
use crate::normalizer::normalize;
use crate::registry::VariableRegistry;
use std::cmp::Ordering;

/// Label rendered for the unclassified bin
pub const UNCLASSIFIED_LABEL: &str = "Sin clasificar";

/// Significant decimals kept when displaying edges
const BASE_PRECISION: i32 = 3;
const MAX_PRECISION: i32 = 20;

// ============================================================================
// BIN
// ============================================================================

#[derive(Debug, Clone, Copy)]
pub enum Bin {
    /// Right-closed interval with display-rounded edges
    Interval { left: f64, right: f64 },

    /// Missing values and values outside every edge
    Unclassified,
}

impl Bin {
    /// Display label: `left:right`, or `left%:right%` for ratios
    pub fn label(&self, as_percentage: bool) -> String {
        match self {
            Bin::Interval { left, right } if as_percentage => format!(
                "{}%:{}%",
                format_float(round_to(left * 100.0, 1)),
                format_float(round_to(right * 100.0, 1))
            ),
            Bin::Interval { left, right } => {
                format!("{}:{}", format_float(*left), format_float(*right))
            }
            Bin::Unclassified => UNCLASSIFIED_LABEL.to_string(),
        }
    }

    pub fn is_interval(&self) -> bool {
        matches!(self, Bin::Interval { .. })
    }
}

// Intervals by lower edge, then upper edge; Unclassified after every interval
impl Ord for Bin {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (
                Bin::Interval { left: l1, right: r1 },
                Bin::Interval { left: l2, right: r2 },
            ) => l1.total_cmp(l2).then(r1.total_cmp(r2)),
            (Bin::Interval { .. }, Bin::Unclassified) => Ordering::Less,
            (Bin::Unclassified, Bin::Interval { .. }) => Ordering::Greater,
            (Bin::Unclassified, Bin::Unclassified) => Ordering::Equal,
        }
    }
}

impl PartialOrd for Bin {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Bin {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Bin {}

// ============================================================================
// CATEGORIZATION
// ============================================================================

/// Ordered bins plus the bin index every row fell into
#[derive(Debug, Clone, PartialEq)]
pub struct Categorization {
    bins: Vec<Bin>,
    assignments: Vec<usize>,
}

impl Categorization {
    /// Bins in display order; `Unclassified` is present only when used
    pub fn bins(&self) -> &[Bin] {
        &self.bins
    }

    /// Index into `bins()` for each row
    pub fn assignments(&self) -> &[usize] {
        &self.assignments
    }

    pub fn bin_of(&self, row: usize) -> Option<Bin> {
        self.assignments.get(row).map(|&i| self.bins[i])
    }

    /// Members of each bin (same order as `bins()`), rows kept in input order
    pub fn group<'a, T>(&self, members: &'a [T]) -> Vec<Vec<&'a T>> {
        let mut groups: Vec<Vec<&T>> = vec![Vec::new(); self.bins.len()];
        for (member, &bin) in members.iter().zip(&self.assignments) {
            groups[bin].push(member);
        }
        groups
    }
}

/// Quantile-bin a series; q must be at least 1
pub fn quantile_bins(values: &[Option<f64>], q: usize) -> Result<Categorization> {
    if q < 1 {
        return Err(CategorizeError::invalid_q(q));
    }

    let mut sorted: Vec<f64> = values
        .iter()
        .flatten()
        .copied()
        .filter(|v| v.is_finite())
        .collect();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let mut edges: Vec<f64> = if sorted.is_empty() {
        Vec::new()
    } else {
        probabilities(q).into_iter().map(|p| quantile(&sorted, p)).collect()
    };
    // A single requested bin keeps its (possibly equal) pair of edges
    if edges.len() != 2 {
        edges.dedup();
    }

    let mut bins: Vec<Bin> = if edges.len() >= 2 {
        let shown = display_edges(&edges);
        shown
            .windows(2)
            .map(|w| Bin::Interval {
                left: w[0],
                right: w[1],
            })
            .collect()
    } else {
        Vec::new()
    };
    let unclassified = bins.len();

    let mut used_unclassified = false;
    let assignments: Vec<usize> = values
        .iter()
        .map(|value| match value.and_then(|v| locate(&edges, v)) {
            Some(bin) => bin,
            None => {
                used_unclassified = true;
                unclassified
            }
        })
        .collect();

    if used_unclassified {
        bins.push(Bin::Unclassified);
    }

    Ok(Categorization { bins, assignments })
}

/// Normalize `variable` in `scale` (optionally against `base_variable`) and bin it
pub fn categorize(
    registry: &VariableRegistry,
    scale: &str,
    variable: &str,
    base_variable: Option<&str>,
    q: usize,
    diagnostics: &mut Diagnostics,
) -> Result<Categorization> {
    if q < 1 {
        return Err(CategorizeError::invalid_q(q));
    }
    let series = normalize(registry, scale, variable, base_variable, diagnostics)?;
    quantile_bins(&series, q)
}

// ============================================================================
// EDGE COMPUTATION
// ============================================================================

/// Probabilities 0, 1/q, ..., 1 (last one pinned to exactly 1)
fn probabilities(q: usize) -> Vec<f64> {
    let step = 1.0 / q as f64;
    (0..=q)
        .map(|i| {
            let p = if i == q { 1.0 } else { i as f64 * step };
            // percent round trip, as percentile-based quantile APIs take it
            (p * 100.0) / 100.0
        })
        .collect()
}

/// Linear-interpolation quantile of sorted, non-empty data
fn quantile(sorted: &[f64], p: f64) -> f64 {
    let n = sorted.len();
    let virtual_index = n as f64 * p + (1.0 - p) - 1.0;

    if virtual_index >= (n - 1) as f64 {
        return sorted[n - 1];
    }
    if virtual_index < 0.0 {
        return sorted[0];
    }

    let below = virtual_index.floor();
    let i = below as usize;
    lerp(sorted[i], sorted[i + 1], virtual_index - below)
}

/// Interpolate from whichever end is closer to keep monotonicity
fn lerp(a: f64, b: f64, t: f64) -> f64 {
    let diff = b - a;
    if t >= 0.5 {
        b - diff * (1.0 - t)
    } else {
        a + diff * t
    }
}

/// Bin index for a value, or None when it lies outside the edges
fn locate(edges: &[f64], value: f64) -> Option<usize> {
    if !value.is_finite() || edges.is_empty() {
        return None;
    }
    let mut idx = edges.partition_point(|e| *e < value);
    if value == edges[0] {
        idx = 1;
    }
    if idx == 0 || idx == edges.len() {
        None
    } else {
        Some(idx - 1)
    }
}

// ============================================================================
// DISPLAY ROUNDING
// ============================================================================

/// Edges rounded to the smallest precision that keeps them distinct,
/// with the first edge lowered by one unit of that precision
fn display_edges(edges: &[f64]) -> Vec<f64> {
    let precision = infer_precision(edges);
    let mut shown: Vec<f64> = edges.iter().map(|&e| round_frac(e, precision)).collect();
    if let Some(first) = shown.first_mut() {
        *first -= 1.0 / power_of_ten(precision);
    }
    shown
}

fn infer_precision(edges: &[f64]) -> i32 {
    for precision in BASE_PRECISION..MAX_PRECISION {
        let mut levels: Vec<f64> = edges.iter().map(|&e| round_frac(e, precision)).collect();
        levels.sort_by(|a, b| a.total_cmp(b));
        levels.dedup();
        if levels.len() == edges.len() {
            return precision;
        }
    }
    BASE_PRECISION
}

/// Round to `precision` decimals, or `precision` significant decimals when |x| < 1
fn round_frac(x: f64, precision: i32) -> f64 {
    if !x.is_finite() || x == 0.0 {
        return x;
    }
    let whole = x.trunc();
    let digits = if whole == 0.0 {
        let frac = x - whole;
        -(frac.abs().log10().floor() as i32) - 1 + precision
    } else {
        precision
    };
    round_to(x, digits)
}

/// Round half to even at `digits` decimals
fn round_to(x: f64, digits: i32) -> f64 {
    if digits >= 0 {
        let f = power_of_ten(digits);
        (x * f).round_ties_even() / f
    } else {
        let f = power_of_ten(-digits);
        (x / f).round_ties_even() * f
    }
}

fn power_of_ten(n: i32) -> f64 {
    (0..n).fold(1.0, |acc, _| acc * 10.0)
}

/// Float text the way Python prints it: `.0` on whole numbers, exponent
/// form (`2.5e-05`, `1e+16`) below 1e-4 or from 1e16 up
pub(crate) fn format_float(x: f64) -> String {
    if !x.is_finite() || x == 0.0 {
        return format!("{:.1}", x);
    }
    let magnitude = x.abs();
    if !(1e-4..1e16).contains(&magnitude) {
        return exponent_form(x);
    }
    if x.fract() == 0.0 {
        format!("{:.1}", x)
    } else {
        format!("{}", x)
    }
}

fn exponent_form(x: f64) -> String {
    let text = format!("{:e}", x);
    match text.split_once('e') {
        Some((mantissa, exponent)) => match exponent.parse::<i32>() {
            Ok(exp) => format!(
                "{}e{}{:02}",
                mantissa,
                if exp < 0 { '-' } else { '+' },
                exp.abs()
            ),
            Err(_) => text,
        },
        None => text,
    }
}

// ============================================================================
// TESTS
// ============================================================================
