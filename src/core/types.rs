use std::sync::Arc;
use std::time::{Duration, SystemTime};

/// Which of the two probe streams produced a `ProbeDataPoint`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeKind {
    SelfProbe,
    Foreign,
}

impl ProbeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ProbeKind::SelfProbe => "self",
            ProbeKind::Foreign => "foreign",
        }
    }
}

/// Direction of an LGC / FlowGroup: which way bytes are flowing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Download,
    Upload,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Download => "download",
            Direction::Upload => "upload",
        }
    }
}

/// One completed probe. Immutable once produced.
#[derive(Debug, Clone)]
pub struct ProbeDataPoint {
    pub start: SystemTime,
    pub duration: Duration,
    /// Number of round trips this probe represents: 1 for self, 3 for
    /// foreign (TCP + TLS + HTTP), per spec.
    pub round_trips: u32,
    pub kind: ProbeKind,
}

/// One throughput sample. Immutable.
#[derive(Debug, Clone)]
pub struct ThroughputDataPoint {
    pub at: SystemTime,
    pub bytes_per_sec: f64,
    pub flow_count: usize,
}

/// Per-LGC snapshot, including transport info exposed only for optional
/// extended-stats harvesting.
#[derive(Debug, Clone)]
pub struct FlowStats {
    pub bytes_transferred: u64,
    pub extended: Option<crate::extended_stats::ExtendedConnStats>,
}

/// The terminal product of one FlowGroup run.
pub struct SelfDataCollectionResult {
    pub direction: Direction,
    /// Final aggregate rate, bytes/sec.
    pub final_rate: f64,
    /// Live LGCs at the time the result was produced, kept around so
    /// extended-stats harvesting (stage 6) can still read their sockets.
    pub live_lgcs: Vec<Arc<dyn super::connection::LoadGeneratingConnection>>,
    pub self_probes: Vec<ProbeDataPoint>,
    pub fully_complete: bool,
}
