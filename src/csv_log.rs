//! CSV data-loggers. Two row shapes exist (`ProbeDataPoint`,
//! `ThroughputDataPoint`); `CsvLogger<T>` is the shared capability set
//! (append row / close) parameterised by row shape, per the data-logger
//! polymorphism note.

use std::fs::File;
use std::sync::{Arc, Mutex};

use chrono::Utc;

use crate::core::types::{ProbeDataPoint, ThroughputDataPoint};

pub trait CsvRow {
    fn header() -> &'static [&'static str];
    fn row(&self) -> Vec<String>;
}

impl CsvRow for ProbeDataPoint {
    fn header() -> &'static [&'static str] {
        &["timestamp", "kind", "duration_seconds", "round_trips"]
    }

    fn row(&self) -> Vec<String> {
        let ts: chrono::DateTime<Utc> = self.start.into();
        vec![
            ts.to_rfc3339(),
            self.kind.as_str().to_string(),
            format!("{:.6}", self.duration.as_secs_f64()),
            self.round_trips.to_string(),
        ]
    }
}

impl CsvRow for ThroughputDataPoint {
    fn header() -> &'static [&'static str] {
        &["timestamp", "bytes_per_sec", "flow_count"]
    }

    fn row(&self) -> Vec<String> {
        let ts: chrono::DateTime<Utc> = self.at.into();
        vec![ts.to_rfc3339(), format!("{:.3}", self.bytes_per_sec), self.flow_count.to_string()]
    }
}

/// A single CSV sink. Disabled (silently a no-op) when its file could not
/// be opened, per the logger-open-failure policy: warn once, continue.
#[derive(Clone)]
pub struct CsvLogger<T> {
    writer: Option<Arc<Mutex<csv::Writer<File>>>>,
    _marker: std::marker::PhantomData<T>,
}

impl<T: CsvRow> CsvLogger<T> {
    fn disabled() -> Self {
        Self {
            writer: None,
            _marker: std::marker::PhantomData,
        }
    }

    fn open(path: &std::path::Path) -> std::io::Result<Self> {
        let file = File::create(path)?;
        let mut writer = csv::WriterBuilder::new().from_writer(file);
        writer.write_record(T::header())?;
        writer.flush()?;
        Ok(Self {
            writer: Some(Arc::new(Mutex::new(writer))),
            _marker: std::marker::PhantomData,
        })
    }

    pub fn append(&self, row: &T) -> crate::error::Result<()> {
        let Some(writer) = &self.writer else { return Ok(()) };
        let mut guard = writer.lock().unwrap();
        guard
            .write_record(row.row())
            .and_then(|_| guard.flush())
            .map_err(|e| crate::error::RpmError::Logger(e.to_string()))
    }
}

pub struct ProbeCsvLoggers {
    pub self_probe: CsvLogger<ProbeDataPoint>,
    pub foreign_probe: CsvLogger<ProbeDataPoint>,
}

pub struct ThroughputCsvLoggers {
    pub download: CsvLogger<ThroughputDataPoint>,
    pub upload: CsvLogger<ThroughputDataPoint>,
}

fn open_or_warn<T: CsvRow>(path: &std::path::Path, label: &str) -> CsvLogger<T> {
    match CsvLogger::open(path) {
        Ok(logger) => logger,
        Err(e) => {
            eprintln!("Warning: could not open {label} logger at {}: {e}; disabling it.", path.display());
            CsvLogger::disabled()
        }
    }
}

/// Opens all four CSV files for one run, named after `basename` and a
/// shared UTC timestamp, per spec.md §6's suffix scheme.
pub fn open_all(basename: &str) -> (ProbeCsvLoggers, ThroughputCsvLoggers) {
    let ts = Utc::now().format("%Y%m%dT%H%M%SZ").to_string();

    let self_probe = open_or_warn(&std::path::PathBuf::from(format!("{basename}-self-{ts}.csv")), "self-probe");
    let foreign_probe = open_or_warn(
        &std::path::PathBuf::from(format!("{basename}-foreign-{ts}.csv")),
        "foreign-probe",
    );
    let download = open_or_warn(
        &std::path::PathBuf::from(format!("{basename}-throughput-download{ts}.csv")),
        "throughput-download",
    );
    let upload = open_or_warn(
        &std::path::PathBuf::from(format!("{basename}-throughput-upload{ts}.csv")),
        "throughput-upload",
    );

    (
        ProbeCsvLoggers { self_probe, foreign_probe },
        ThroughputCsvLoggers { download, upload },
    )
}
