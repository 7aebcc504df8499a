// Domain layer - telemetry, chart and calibration models
pub mod calibration;
pub mod calibration_status;
pub mod charts;
pub mod connectivity;
pub mod device_config;
pub mod sample;
pub mod series;
