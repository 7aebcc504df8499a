// Device configuration - the calibration-related part of /get-config
use serde::Deserialize;

/// Calibration fields read from `/get-config`; everything else the device
/// reports is owned by the settings forms and ignored here.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeviceConfig {
    #[serde(default)]
    pub ph_cal_valid: Option<bool>,
    #[serde(default)]
    pub ph_calibration_date: Option<String>,
    #[serde(default)]
    pub ph_calibration_temp: Option<f64>,
    #[serde(default)]
    pub orp_calibration_offset: Option<f64>,
    #[serde(default)]
    pub orp_calibration_slope: Option<f64>,
    #[serde(default)]
    pub orp_calibration_date: Option<String>,
    #[serde(default)]
    pub orp_calibration_reference: Option<f64>,
    #[serde(default)]
    pub temp_calibration_offset: Option<f64>,
    #[serde(default)]
    pub temp_calibration_date: Option<String>,
}
