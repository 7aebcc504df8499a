// Trend charts - per-metric rolling series with reference band overlays
use super::sample::{Metric, Sample};
use super::series::{DisplayBounds, RollingSeries, DEFAULT_PADDING};
use chrono::{DateTime, Local, Utc};
use serde::Serialize;

/// Nominal safe range drawn as shading around a metric.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ReferenceBand {
    pub low: f64,
    pub high: f64,
}

pub const PH_BAND: ReferenceBand = ReferenceBand { low: 7.0, high: 7.4 };
pub const ORP_BAND: ReferenceBand = ReferenceBand {
    low: 600.0,
    high: 800.0,
};

/// Default vertical axis for the banded metrics.
pub const PH_AXIS: DisplayBounds = DisplayBounds::new(6.5, 8.0);
pub const ORP_AXIS: DisplayBounds = DisplayBounds::new(400.0, 900.0);

pub fn time_label(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%H:%M:%S").to_string()
}

/// Auxiliary series kept the same length as the primary series: the two
/// boundary lines and the two fills out to the current display edges.
#[derive(Debug, Clone)]
struct BandOverlay {
    band: ReferenceBand,
    axis: DisplayBounds,
    bounds: DisplayBounds,
    low_line: Vec<f64>,
    high_line: Vec<f64>,
    floor_fill: Vec<f64>,
    ceiling_fill: Vec<f64>,
}

impl BandOverlay {
    fn new(band: ReferenceBand, axis: DisplayBounds) -> Self {
        Self {
            band,
            axis,
            bounds: axis,
            low_line: Vec::new(),
            high_line: Vec::new(),
            floor_fill: Vec::new(),
            ceiling_fill: Vec::new(),
        }
    }

    /// Rebuilds every auxiliary series over the whole label axis. Bounds can
    /// move when a new extreme arrives, so old entries change as well.
    fn refill(&mut self, primary: &RollingSeries, padding: f64) {
        self.bounds = primary.compute_display_bounds(self.axis.min, self.axis.max, padding);
        let len = primary.len();
        self.low_line = vec![self.band.low; len];
        self.high_line = vec![self.band.high; len];
        self.floor_fill = vec![self.bounds.min; len];
        self.ceiling_fill = vec![self.bounds.max; len];
    }

    fn view(&self) -> BandView {
        BandView {
            low: self.band.low,
            high: self.band.high,
            low_line: self.low_line.clone(),
            high_line: self.high_line.clone(),
            floor_fill: self.floor_fill.clone(),
            ceiling_fill: self.ceiling_fill.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BandView {
    pub low: f64,
    pub high: f64,
    pub low_line: Vec<f64>,
    pub high_line: Vec<f64>,
    pub floor_fill: Vec<f64>,
    pub ceiling_fill: Vec<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChartView {
    pub metric: Metric,
    pub labels: Vec<String>,
    pub values: Vec<Option<f64>>,
    pub bounds: Option<DisplayBounds>,
    pub band: Option<BandView>,
}

#[derive(Debug, Clone)]
pub struct MetricChart {
    metric: Metric,
    series: RollingSeries,
    overlay: Option<BandOverlay>,
}

impl MetricChart {
    pub fn new(metric: Metric, capacity: usize) -> Self {
        let overlay = match metric {
            Metric::Temperature => None,
            Metric::Ph => Some(BandOverlay::new(PH_BAND, PH_AXIS)),
            Metric::Orp => Some(BandOverlay::new(ORP_BAND, ORP_AXIS)),
        };
        Self {
            metric,
            series: RollingSeries::with_capacity(capacity),
            overlay,
        }
    }

    pub fn push(&mut self, value: Option<f64>, label: impl Into<String>) {
        let value = match self.metric {
            // pH is charted at one decimal, as displayed
            Metric::Ph => value.map(|v| (v * 10.0).round() / 10.0),
            _ => value,
        };
        self.series.append(value, label);
        if let Some(overlay) = self.overlay.as_mut() {
            overlay.refill(&self.series, DEFAULT_PADDING);
        }
    }

    pub fn clear(&mut self) {
        self.series.clear();
        if let Some(overlay) = self.overlay.as_mut() {
            overlay.refill(&self.series, DEFAULT_PADDING);
        }
    }

    pub fn series(&self) -> &RollingSeries {
        &self.series
    }

    pub fn bounds(&self) -> Option<DisplayBounds> {
        match &self.overlay {
            Some(overlay) => Some(overlay.bounds),
            None => self.series.auto_bounds(DEFAULT_PADDING),
        }
    }

    pub fn view(&self) -> ChartView {
        ChartView {
            metric: self.metric,
            labels: self.series.labels(),
            values: self.series.values(),
            bounds: self.bounds(),
            band: self.overlay.as_ref().map(BandOverlay::view),
        }
    }
}

/// The three dashboard charts, fed by polling and history seeding.
#[derive(Debug, Clone)]
pub struct TrendCharts {
    temperature: MetricChart,
    ph: MetricChart,
    orp: MetricChart,
}

impl TrendCharts {
    pub fn new(capacity: usize) -> Self {
        Self {
            temperature: MetricChart::new(Metric::Temperature, capacity),
            ph: MetricChart::new(Metric::Ph, capacity),
            orp: MetricChart::new(Metric::Orp, capacity),
        }
    }

    pub fn chart(&self, metric: Metric) -> &MetricChart {
        match metric {
            Metric::Temperature => &self.temperature,
            Metric::Ph => &self.ph,
            Metric::Orp => &self.orp,
        }
    }

    fn chart_mut(&mut self, metric: Metric) -> &mut MetricChart {
        match metric {
            Metric::Temperature => &mut self.temperature,
            Metric::Ph => &mut self.ph,
            Metric::Orp => &mut self.orp,
        }
    }

    /// Appends one point per metric; missing values become gaps so the
    /// label axes stay aligned.
    pub fn push_sample(&mut self, sample: &Sample, label: &str) {
        for metric in Metric::ALL {
            self.chart_mut(metric).push(sample.value(metric), label);
        }
    }

    pub fn push(&mut self, metric: Metric, value: f64, label: &str) {
        self.chart_mut(metric).push(Some(value), label);
    }

    pub fn clear(&mut self) {
        for metric in Metric::ALL {
            self.chart_mut(metric).clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample(temp: Option<f64>, ph: Option<f64>, orp: Option<f64>) -> Sample {
        Sample {
            timestamp: Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap(),
            temperature: temp,
            temperature_raw: temp,
            ph,
            orp,
            orp_raw: orp,
            filtration_running: false,
            time_synced: true,
        }
    }

    #[test]
    fn test_band_series_follow_primary_length() {
        let mut charts = TrendCharts::new(5);
        for i in 0..8 {
            charts.push_sample(&sample(Some(25.0), Some(7.2), Some(700.0)), &format!("t{}", i));
        }

        let view = charts.chart(Metric::Orp).view();
        let band = view.band.unwrap();
        assert_eq!(view.values.len(), 5);
        assert_eq!(band.low_line.len(), 5);
        assert_eq!(band.high_line.len(), 5);
        assert_eq!(band.floor_fill.len(), 5);
        assert_eq!(band.ceiling_fill.len(), 5);
        assert!(band.low_line.iter().all(|v| *v == 600.0));
        assert!(band.high_line.iter().all(|v| *v == 800.0));
    }

    #[test]
    fn test_fills_move_retroactively_with_bounds() {
        let mut charts = TrendCharts::new(100);
        charts.push(Metric::Orp, 700.0, "a");
        charts.push(Metric::Orp, 710.0, "b");
        assert_eq!(charts.chart(Metric::Orp).bounds(), Some(ORP_AXIS));

        charts.push(Metric::Orp, 1000.0, "c");
        let view = charts.chart(Metric::Orp).view();
        let bounds = view.bounds.unwrap();
        assert!(bounds.max > 1000.0);
        let band = view.band.unwrap();
        assert!(band.ceiling_fill.iter().all(|v| *v == bounds.max));
        assert!(band.floor_fill.iter().all(|v| *v == ORP_AXIS.min));
    }

    #[test]
    fn test_missing_values_keep_axes_aligned() {
        let mut charts = TrendCharts::new(100);
        charts.push_sample(&sample(Some(25.0), None, Some(650.0)), "a");
        charts.push_sample(&sample(None, Some(7.26), None), "b");

        for metric in Metric::ALL {
            assert_eq!(charts.chart(metric).series().len(), 2);
        }
        assert_eq!(charts.chart(Metric::Ph).series().values(), vec![None, Some(7.3)]);
    }

    #[test]
    fn test_temperature_has_auto_bounds_and_no_band() {
        let mut charts = TrendCharts::new(100);
        assert!(charts.chart(Metric::Temperature).bounds().is_none());
        charts.push(Metric::Temperature, 24.0, "a");
        charts.push(Metric::Temperature, 26.0, "b");

        let view = charts.chart(Metric::Temperature).view();
        assert!(view.band.is_none());
        let bounds = view.bounds.unwrap();
        assert!(bounds.min < 24.0 && bounds.max > 26.0);
    }
}
