// Calibration status view - "needs recalibration" derived from device dates
use super::device_config::DeviceConfig;
use chrono::{DateTime, NaiveDateTime, TimeDelta, TimeZone, Utc};
use serde::Serialize;

pub const FRESHNESS_WINDOW_DAYS: i64 = 90;

/// Numeric dates below this are epoch seconds, above it milliseconds.
const EPOCH_MILLIS_CUTOFF: f64 = 1e11;

/// Parses a device calibration date. The device writes either RFC 3339 or
/// a naive local `YYYY-MM-DDTHH:MM:SS`; older firmware stored epochs.
pub fn parse_calibration_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }

    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc());
        }
    }

    let number: f64 = raw.parse().ok()?;
    if !number.is_finite() || number <= 0.0 {
        return None;
    }
    let millis = if number < EPOCH_MILLIS_CUTOFF {
        number * 1000.0
    } else {
        number
    };
    Utc.timestamp_millis_opt(millis as i64).single()
}

/// True when the date is absent, unparsable or older than `window`.
pub fn needs_recalibration(date: Option<&str>, now: DateTime<Utc>, window: TimeDelta) -> bool {
    match date.and_then(parse_calibration_date) {
        Some(calibrated_at) => now - calibrated_at > window,
        None => true,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CalibrationDetail {
    PhBufferTemperature { celsius: f64 },
    OrpReference { millivolts: f64 },
    TemperatureOffset { celsius: f64 },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorCalibrationStatus {
    pub needs_recalibration: bool,
    pub last_calibrated: Option<DateTime<Utc>>,
    pub detail: Option<CalibrationDetail>,
}

impl SensorCalibrationStatus {
    fn derive(
        date: Option<&str>,
        now: DateTime<Utc>,
        window: TimeDelta,
        detail: Option<CalibrationDetail>,
    ) -> Self {
        let last_calibrated = date.and_then(parse_calibration_date);
        Self {
            needs_recalibration: needs_recalibration(date, now, window),
            detail: last_calibrated.and(detail),
            last_calibrated,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalibrationStatusBoard {
    pub temperature: SensorCalibrationStatus,
    pub ph: SensorCalibrationStatus,
    pub orp: SensorCalibrationStatus,
    /// Global chip, raised by the chemistry probes only.
    pub attention_needed: bool,
}

impl CalibrationStatusBoard {
    pub fn from_config(config: &DeviceConfig, now: DateTime<Utc>, window: TimeDelta) -> Self {
        let mut ph = SensorCalibrationStatus::derive(
            config.ph_calibration_date.as_deref(),
            now,
            window,
            config
                .ph_calibration_temp
                .filter(|t| t.is_finite())
                .map(|celsius| CalibrationDetail::PhBufferTemperature { celsius }),
        );
        if config.ph_cal_valid == Some(false) {
            ph.needs_recalibration = true;
        }

        let orp = SensorCalibrationStatus::derive(
            config.orp_calibration_date.as_deref(),
            now,
            window,
            config
                .orp_calibration_reference
                .filter(|r| *r > 0.0)
                .map(|millivolts| CalibrationDetail::OrpReference { millivolts }),
        );

        let temperature = SensorCalibrationStatus::derive(
            config.temp_calibration_date.as_deref(),
            now,
            window,
            config
                .temp_calibration_offset
                .filter(|o| o.is_finite())
                .map(|celsius| CalibrationDetail::TemperatureOffset { celsius }),
        );

        let attention_needed = ph.needs_recalibration || orp.needs_recalibration;
        Self {
            temperature,
            ph,
            orp,
            attention_needed,
        }
    }
}
