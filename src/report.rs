//! Stdout report formatting: stable, parse-friendly, per spec.md §6.

use chrono::Utc;

use crate::core::controller::Report;

pub fn render(report: &Report, host: &str, port: u16) -> String {
    let now = Utc::now().format("%m-%d-%Y %H:%M:%S");
    let mut out = String::new();

    out.push_str(&format!("{now} UTC Go Responsiveness to {host}:{port}...\n"));
    out.push_str(&format!(
        "Download: {:.3} Mbps ({:.3} MBps), using {} parallel connections.\n",
        report.download_mbps,
        report.download_mbps / 8.0,
        report.download_flows
    ));
    out.push_str(&format!(
        "Upload:   {:.3} Mbps ({:.3} MBps), using {} parallel connections.\n",
        report.upload_mbps,
        report.upload_mbps / 8.0,
        report.upload_flows
    ));
    out.push_str(&format!("RPM: {:>5}", report.rpm.round() as i64));

    if !report.extended.is_empty() {
        out.push('\n');
        out.push_str("Extended stats:\n");
        for (direction, stats) in &report.extended {
            let label = direction.as_str();
            match stats {
                Some(s) => out.push_str(&format!(
                    "  {label}: retransmits={} rtt={}us rttvar={}us cwnd={}\n",
                    s.retransmits, s.rtt_us, s.rtt_var_us, s.congestion_window
                )),
                None => out.push_str(&format!("  {label}: unavailable\n")),
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rpm_field_is_right_aligned_in_a_five_wide_column() {
        let report = Report {
            download_mbps: 100.0,
            download_flows: 8,
            upload_mbps: 50.0,
            upload_flows: 4,
            rpm: 1714.285,
            extended: Vec::new(),
        };
        let text = render(&report, "example.test", 443);
        assert!(text.contains("RPM:  1714"));
    }

    #[test]
    fn download_and_upload_lines_report_mbps_and_flow_count() {
        let report = Report {
            download_mbps: 96.0,
            download_flows: 8,
            upload_mbps: 48.0,
            upload_flows: 4,
            rpm: 1000.0,
            extended: Vec::new(),
        };
        let text = render(&report, "example.test", 443);
        assert!(text.contains("Download: 96.000 Mbps (12.000 MBps), using 8 parallel connections."));
        assert!(text.contains("Upload:   48.000 Mbps (6.000 MBps), using 4 parallel connections."));
    }
}
