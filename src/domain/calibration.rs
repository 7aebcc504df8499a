// Calibration math - corrections, operator input rules and step projection
use serde::Serialize;
use std::ops::RangeInclusive;

pub const TEMPERATURE_REFERENCE_RANGE: RangeInclusive<f64> = -10.0..=50.0;
pub const ORP_REFERENCE_RANGE: RangeInclusive<f64> = 0.0..=1000.0;

/// Raw ORP readings closer than this make the regression ill-conditioned.
pub const MIN_MEASURED_SPREAD_MV: f64 = 10.0;
pub const MIN_REFERENCE_SPREAD_MV: f64 = 50.0;

/// Operator input rejected before anything is sent to the device.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("no reference value entered")]
    MissingReference,
    #[error("reference {value} is outside {min}..={max}")]
    ReferenceOutOfRange { value: f64, min: f64, max: f64 },
    #[error("no raw {field} reading available")]
    MissingRawReading { field: &'static str },
    #[error("first calibration point was not captured")]
    MissingFirstPoint,
    #[error("raw readings are only {delta:.1} mV apart, use more distant solutions")]
    MeasurementsTooClose { delta: f64 },
    #[error("references are only {delta:.0} mV apart, use more distant solutions")]
    ReferencesTooClose { delta: f64 },
}

pub fn check_reference(
    value: Option<f64>,
    range: &RangeInclusive<f64>,
) -> Result<f64, ValidationError> {
    let value = value.ok_or(ValidationError::MissingReference)?;
    if value.is_finite() && range.contains(&value) {
        Ok(value)
    } else {
        Err(ValidationError::ReferenceOutOfRange {
            value,
            min: *range.start(),
            max: *range.end(),
        })
    }
}

/// Linear correction applied by the device: `value = raw * slope + offset`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Correction {
    pub offset: f64,
    pub slope: f64,
}

impl Correction {
    /// Single-point correction taking the reference as ground truth.
    pub fn offset_only(reference: f64, raw: f64) -> Self {
        Self {
            offset: reference - raw,
            slope: 1.0,
        }
    }

    pub fn apply(&self, raw: f64) -> f64 {
        raw * self.slope + self.offset
    }
}

/// One (raw reading, reference solution) pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CalibrationPoint {
    pub measured: f64,
    pub reference: f64,
}

/// Fits the line through two points, refusing ill-conditioned pairs.
pub fn two_point_correction(
    first: CalibrationPoint,
    second: CalibrationPoint,
) -> Result<Correction, ValidationError> {
    let measured_delta = (first.measured - second.measured).abs();
    if measured_delta < MIN_MEASURED_SPREAD_MV {
        return Err(ValidationError::MeasurementsTooClose {
            delta: measured_delta,
        });
    }

    let reference_delta = (first.reference - second.reference).abs();
    if reference_delta < MIN_REFERENCE_SPREAD_MV {
        return Err(ValidationError::ReferencesTooClose {
            delta: reference_delta,
        });
    }

    let slope = (second.reference - first.reference) / (second.measured - first.measured);
    let offset = first.reference - first.measured * slope;
    Ok(Correction { offset, slope })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StepMark {
    Pending,
    Active,
    Completed,
}

/// Marks for steps `1..=total` given the current step (0 is idle).
pub fn step_marks(current: u8, total: u8) -> Vec<StepMark> {
    (1..=total)
        .map(|step| match step.cmp(&current) {
            std::cmp::Ordering::Less => StepMark::Completed,
            std::cmp::Ordering::Equal => StepMark::Active,
            std::cmp::Ordering::Greater => StepMark::Pending,
        })
        .collect()
}
