pub mod body;
pub mod connection;
pub mod constants;
pub mod controller;
pub mod flow_group;
pub mod foreign_prober;
pub mod percentile;
pub mod self_prober;
pub mod types;

pub use controller::{ControllerConfig, RPMController, Report};
