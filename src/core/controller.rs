//! RPMController: the top-level staged-shutdown coordinator. Owns the
//! nested cancellation scopes, runs both FlowGroups and the ForeignProber
//! in parallel, enforces timeouts, reduces results to RPM, and orchestrates
//! the ordered shutdown sequence in spec.md §4.5.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio::time;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::config::Config;
use crate::core::flow_group::{FlowGroup, FlowGroupConfig, FlowGroupHandles};
use crate::core::percentile::p90_seconds;
use crate::core::types::Direction;
use crate::error::{Result, RpmError};
use crate::extended_stats;
use crate::keylog::KeyLogWriter;

pub struct ControllerConfig {
    pub saturation_timeout: Duration,
    pub rpm_timeout: Duration,
    pub extended_stats: bool,
}

/// Final, structured reduction of one run. Kept separate from its textual
/// rendering (`crate::report`) so tests can assert on values.
pub struct Report {
    pub download_mbps: f64,
    pub download_flows: usize,
    pub upload_mbps: f64,
    pub upload_flows: usize,
    pub rpm: f64,
    pub extended: Vec<(Direction, Option<crate::extended_stats::ExtendedConnStats>)>,
}

pub struct RPMController {
    config: Config,
    tls_config: Arc<rustls::ClientConfig>,
    controller_config: ControllerConfig,
    logger: crate::logging::DebugLogger,
}

impl RPMController {
    pub fn new(
        config: Config,
        key_log: Option<Arc<KeyLogWriter>>,
        controller_config: ControllerConfig,
        logger: crate::logging::DebugLogger,
    ) -> Self {
        let tls_config = crate::tls::client_config(key_log);
        Self {
            config,
            tls_config,
            controller_config,
            logger,
        }
    }

    /// `shutdown` is the operating scope (RPMController scope #1) itself —
    /// the caller owns cancelling it (Ctrl-C, a parent deadline, ...) and
    /// every nested scope below it observes that the same way it would
    /// observe this method's own timeout-driven cancellations.
    pub async fn run(
        &self,
        probe_log: Option<&crate::csv_log::ProbeCsvLoggers>,
        throughput_log: Option<&crate::csv_log::ThroughputCsvLoggers>,
        shutdown: CancellationToken,
    ) -> Result<Report> {
        let operating_scope = shutdown;
        let data_scope = operating_scope.child_token();
        let network_scope = operating_scope.child_token();
        let foreign_scope = operating_scope.child_token();

        let small_url = self.config.small_https_download_url()?;
        let small_path = path_and_query(&small_url);

        let download_group = Arc::new(FlowGroup::new(
            Direction::Download,
            self.config.large_https_download_url()?,
            small_path.clone(),
            self.tls_config.clone(),
            FlowGroupConfig::default(),
            self.logger.clone(),
        ));
        let upload_group = Arc::new(FlowGroup::new(
            Direction::Upload,
            self.config.upload_url()?,
            small_path,
            self.tls_config.clone(),
            FlowGroupConfig::default(),
            self.logger.clone(),
        ));

        let FlowGroupHandles {
            complete_rx: mut download_complete,
            result_rx: download_result,
            throughput_rx: mut download_throughput,
        } = download_group.spawn(data_scope.clone(), network_scope.clone());
        let FlowGroupHandles {
            complete_rx: mut upload_complete,
            result_rx: upload_result,
            throughput_rx: mut upload_throughput,
        } = upload_group.spawn(data_scope.clone(), network_scope.clone());

        let foreign_prober = crate::core::foreign_prober::ForeignProber::new(small_url, self.tls_config.clone());
        let (foreign_tx, mut foreign_rx) = mpsc::unbounded_channel();
        let foreign_task_scope = foreign_scope.clone();
        tokio::spawn(async move {
            foreign_prober.run(foreign_task_scope, foreign_tx).await;
        });

        // Drain throughput samples as they arrive for the lifetime of the
        // run, optionally logging them; we don't need the values here
        // beyond logging, the FlowGroup results carry the final rate.
        let throughput_logger_dl = throughput_log.map(|l| l.download.clone());
        let throughput_logger_ul = throughput_log.map(|l| l.upload.clone());
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    Some(point) = download_throughput.recv() => {
                        if let Some(logger) = &throughput_logger_dl {
                            let _ = logger.append(&point);
                        }
                    }
                    Some(point) = upload_throughput.recv() => {
                        if let Some(logger) = &throughput_logger_ul {
                            let _ = logger.append(&point);
                        }
                    }
                    else => break,
                }
            }
        });

        // --- Stage 1 & 2: wait for both completions, extending the
        // deadline once if the saturation timeout elapses first. ---
        let mut download_done: Option<bool> = None;
        let mut upload_done: Option<bool> = None;
        let stage1_deadline = Instant::now() + self.controller_config.saturation_timeout;

        loop {
            if download_done.is_some() && upload_done.is_some() {
                break;
            }
            let sleep = time::sleep_until(stage1_deadline.into());
            tokio::select! {
                res = &mut download_complete, if download_done.is_none() => {
                    download_done = Some(res.unwrap_or(false));
                }
                res = &mut upload_complete, if upload_done.is_none() => {
                    upload_done = Some(res.unwrap_or(false));
                }
                _ = sleep => break,
            }
        }

        if download_done.is_none() || upload_done.is_none() {
            // Saturation timeout elapsed with at least one FlowGroup still
            // running. Force stage 3 early to obtain provisional results,
            // then wait out the RPM-calculation timeout for them to land.
            data_scope.cancel();
            let stage2_deadline = Instant::now() + self.controller_config.rpm_timeout;

            loop {
                if download_done.is_some() && upload_done.is_some() {
                    break;
                }
                let sleep = time::sleep_until(stage2_deadline.into());
                tokio::select! {
                    res = &mut download_complete, if download_done.is_none() => {
                        download_done = Some(res.unwrap_or(false));
                    }
                    res = &mut upload_complete, if upload_done.is_none() => {
                        upload_done = Some(res.unwrap_or(false));
                    }
                    _ = sleep => break,
                }
            }

            if download_done.is_none() && upload_done.is_none() {
                operating_scope.cancel();
                return Err(RpmError::SaturationTimeout);
            }
        }

        // --- Stage 3: cancel scope #2. Idempotent if stage 2 already did. ---
        data_scope.cancel();

        // --- Stage 4: cancel scope #4. ---
        foreign_scope.cancel();

        // --- Stage 5: await both final results, bounded by the
        // RPM-calculation timeout. ---
        let stage5_deadline = time::Instant::now() + self.controller_config.rpm_timeout;
        let download_result = time::timeout_at(stage5_deadline, download_result)
            .await
            .map_err(|_| RpmError::CollectionTimeout)?
            .map_err(|_| RpmError::CollectionTimeout)?;
        let upload_result = time::timeout_at(stage5_deadline, upload_result)
            .await
            .map_err(|_| RpmError::CollectionTimeout)?
            .map_err(|_| RpmError::CollectionTimeout)?;

        // --- Stage 6: extended-stats harvest, while sockets are still open. ---
        let mut extended = Vec::new();
        if self.controller_config.extended_stats {
            if !extended_stats::supported() {
                eprintln!("Warning: extended stats not available on this platform; disabling.");
            } else {
                for lgc in &download_result.live_lgcs {
                    extended.push((Direction::Download, lgc.stats().extended));
                }
                for lgc in &upload_result.live_lgcs {
                    extended.push((Direction::Upload, lgc.stats().extended));
                }
            }
        }

        // --- Stage 7: cancel scope #3, LGCs close. ---
        network_scope.cancel();
        for lgc in &download_result.live_lgcs {
            lgc.close().await;
        }
        for lgc in &upload_result.live_lgcs {
            lgc.close().await;
        }

        // --- Stage 8: drain the foreign-probe channel. ---
        let mut foreign_probes = Vec::new();
        while let Ok(point) = foreign_rx.try_recv() {
            foreign_probes.push(point);
        }

        if let Some(logger) = probe_log {
            for p in download_result.self_probes.iter().chain(upload_result.self_probes.iter()) {
                let _ = logger.self_probe.append(p);
            }
            for p in &foreign_probes {
                let _ = logger.foreign_probe.append(p);
            }
        }

        // --- Stage 9: compute RPM. ---
        let self_durations: Vec<f64> = download_result
            .self_probes
            .iter()
            .chain(upload_result.self_probes.iter())
            .map(|p| p.duration.as_secs_f64())
            .collect();
        let foreign_durations: Vec<f64> = foreign_probes.iter().map(|p| p.duration.as_secs_f64()).collect();

        let rtt_self_p90 = p90_seconds(&self_durations);
        let rtt_foreign_p90 = p90_seconds(&foreign_durations);
        let rpm = if (rtt_self_p90 + rtt_foreign_p90) > 0.0 {
            60.0 / ((rtt_self_p90 + rtt_foreign_p90) / 2.0)
        } else {
            0.0
        };

        let report = Report {
            download_mbps: download_result.final_rate * 8.0 / 1_000_000.0,
            download_flows: download_result.live_lgcs.len(),
            upload_mbps: upload_result.final_rate * 8.0 / 1_000_000.0,
            upload_flows: upload_result.live_lgcs.len(),
            rpm,
            extended,
        };

        // --- Stage 10: tear everything else down. ---
        operating_scope.cancel();

        Ok(report)
    }
}

fn path_and_query(url: &Url) -> String {
    let mut p = url.path().to_string();
    if let Some(q) = url.query() {
        p.push('?');
        p.push_str(q);
    }
    p
}
