//! S6 — logger basename: four CSVs appear whose names embed direction and
//! a UTC timestamp, each with at least one data row.

use std::time::{Duration, SystemTime};

use rpmprobe::core::types::{ProbeDataPoint, ProbeKind, ThroughputDataPoint};
use rpmprobe::csv_log;

#[test]
fn opening_by_basename_produces_four_named_csvs_with_rows() {
    let dir = tempfile::tempdir().unwrap();
    let basename = dir.path().join("run").to_string_lossy().to_string();

    let (probes, throughput) = csv_log::open_all(&basename);

    probes
        .self_probe
        .append(&ProbeDataPoint {
            start: SystemTime::now(),
            duration: Duration::from_millis(20),
            round_trips: 1,
            kind: ProbeKind::SelfProbe,
        })
        .unwrap();
    probes
        .foreign_probe
        .append(&ProbeDataPoint {
            start: SystemTime::now(),
            duration: Duration::from_millis(50),
            round_trips: 3,
            kind: ProbeKind::Foreign,
        })
        .unwrap();
    throughput
        .download
        .append(&ThroughputDataPoint {
            at: SystemTime::now(),
            bytes_per_sec: 12_500_000.0,
            flow_count: 8,
        })
        .unwrap();
    throughput
        .upload
        .append(&ThroughputDataPoint {
            at: SystemTime::now(),
            bytes_per_sec: 6_000_000.0,
            flow_count: 4,
        })
        .unwrap();

    let entries: Vec<String> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .collect();

    assert!(entries.iter().any(|n| n.contains("-self-") && n.ends_with(".csv")));
    assert!(entries.iter().any(|n| n.contains("-foreign-") && n.ends_with(".csv")));
    assert!(entries.iter().any(|n| n.contains("-throughput-download") && n.ends_with(".csv")));
    assert!(entries.iter().any(|n| n.contains("-throughput-upload") && n.ends_with(".csv")));

    for name in &entries {
        let contents = std::fs::read_to_string(dir.path().join(name)).unwrap();
        assert!(contents.lines().count() >= 2, "{name} should have a header and at least one row");
    }
}
