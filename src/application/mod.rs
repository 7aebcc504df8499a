// Application layer - use cases behind the device port
pub mod calibration;
pub mod device_api;
pub mod telemetry_poller;

#[cfg(test)]
pub mod test_support;
