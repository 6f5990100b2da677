use std::time::Duration;

pub const PROBE_INTERVAL: Duration = Duration::from_millis(100);
pub const MEASUREMENT_INTERVAL: Duration = Duration::from_secs(1);
pub const ADD_FLOWS_STEP: usize = 4;
pub const INSTABILITY_MOVING_AVERAGE_INTERVAL_COUNT: usize = 4;
pub const STABILITY_DELTA: f64 = 0.05;
pub const TRIMMED_MEAN_PERCENTILE: f64 = 0.05;

pub const DEFAULT_CONFIG_HOST: &str = "networkquality.example.net";
pub const DEFAULT_PORT_NUMBER: u16 = 443;
pub const DEFAULT_CONFIG_PATH: &str = "/config";

pub const DEFAULT_SATURATION_TIMEOUT: Duration = Duration::from_secs(20);
pub const DEFAULT_RPM_TIMEOUT: Duration = Duration::from_secs(10);
