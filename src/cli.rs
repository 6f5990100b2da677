use clap::Parser;

// Kept in sync with `crate::core::constants`'s defaults by hand: clap's
// derive attributes need literal default values, not const references.

#[derive(Parser, Debug)]
#[command(name = "rpmprobe")]
#[command(version = concat!("Ver:", env!("CARGO_PKG_VERSION")))]
#[command(about = "Measures responsiveness under working conditions (RPM)")]
pub struct Cli {
    /// Discovery-endpoint host.
    #[arg(long = "config", default_value = "networkquality.example.net")]
    pub config_host: String,

    /// Discovery-endpoint port.
    #[arg(long = "port", default_value_t = 443)]
    pub port: u16,

    /// Discovery-endpoint path.
    #[arg(long = "path", default_value = "/config")]
    pub path: String,

    /// Verbose progress logging.
    #[arg(long = "debug")]
    pub debug: bool,

    /// Saturation-phase max duration, in seconds.
    #[arg(long = "sattimeout", default_value_t = 20)]
    pub saturation_timeout_secs: u64,

    /// Collection/provisional-phase duration, in seconds.
    #[arg(long = "rpmtimeout", default_value_t = 10)]
    pub rpm_timeout_secs: u64,

    /// Append TLS session keys in NSS key-log format to this path.
    #[arg(long = "ssl-key-file")]
    pub ssl_key_file: Option<String>,

    /// Write a CPU flamegraph profile to this path for the run's duration.
    #[arg(long = "profile")]
    pub profile: Option<String>,

    /// Include kernel counters (TCP_INFO or equivalent) in the report.
    #[arg(long = "extended-stats")]
    pub extended_stats: bool,

    /// Emit four CSV files named after this basename.
    #[arg(long = "logger-filename")]
    pub logger_filename: Option<String>,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
