// Rolling series - bounded FIFO of chart points and display bounds
use serde::Serialize;
use std::collections::VecDeque;

pub const DEFAULT_CAPACITY: usize = 100;
pub const DEFAULT_PADDING: f64 = 0.1;

/// Smallest span used for data-driven bounds, so a flat line still gets an axis.
const MIN_AUTO_SPAN: f64 = 0.5;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesPoint {
    pub label: String,
    pub value: Option<f64>,
}

/// Vertical axis range of a chart.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DisplayBounds {
    pub min: f64,
    pub max: f64,
}

impl DisplayBounds {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }
}

/// Ordered buffer of points; appending past capacity drops the oldest.
#[derive(Debug, Clone)]
pub struct RollingSeries {
    points: VecDeque<SeriesPoint>,
    capacity: usize,
}

impl Default for RollingSeries {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl RollingSeries {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            points: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn append(&mut self, value: Option<f64>, label: impl Into<String>) {
        if self.points.len() == self.capacity {
            self.points.pop_front();
        }
        self.points.push_back(SeriesPoint {
            label: label.into(),
            value: value.filter(|v| v.is_finite()),
        });
    }

    pub fn clear(&mut self) {
        self.points.clear();
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn values(&self) -> Vec<Option<f64>> {
        self.points.iter().map(|p| p.value).collect()
    }

    pub fn labels(&self) -> Vec<String> {
        self.points.iter().map(|p| p.label.clone()).collect()
    }

    fn finite_values(&self) -> impl Iterator<Item = f64> + '_ {
        self.points.iter().filter_map(|p| p.value)
    }

    /// Bounds for a metric with a nominal range.
    ///
    /// In-range data keeps the defaults. A side that is exceeded moves past
    /// the extreme value by `padding` times the default range stretched to
    /// include that value, so real data is never clipped.
    pub fn compute_display_bounds(
        &self,
        default_min: f64,
        default_max: f64,
        padding: f64,
    ) -> DisplayBounds {
        let mut lowest = f64::INFINITY;
        let mut highest = f64::NEG_INFINITY;
        for value in self.finite_values() {
            lowest = lowest.min(value);
            highest = highest.max(value);
        }

        if lowest > highest || (lowest >= default_min && highest <= default_max) {
            return DisplayBounds::new(default_min, default_max);
        }

        let span = default_max.max(highest) - default_min.min(lowest);
        let margin = padding * span;

        let min = if lowest < default_min {
            lowest - margin
        } else {
            default_min
        };
        let max = if highest > default_max {
            highest + margin
        } else {
            default_max
        };

        DisplayBounds::new(min, max)
    }

    /// Fully data-driven bounds, used for metrics without a nominal range.
    pub fn auto_bounds(&self, padding: f64) -> Option<DisplayBounds> {
        let mut values = self.finite_values();
        let first = values.next()?;
        let (lowest, highest) = values.fold((first, first), |(lo, hi), v| (lo.min(v), hi.max(v)));

        let span = (highest - lowest).max(MIN_AUTO_SPAN);
        let margin = span * padding;
        let centre_pad = (span - (highest - lowest)) / 2.0;

        Some(DisplayBounds::new(
            lowest - centre_pad - margin,
            highest + centre_pad + margin,
        ))
    }
}
