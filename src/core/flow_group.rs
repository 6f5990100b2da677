//! FlowGroup: grows a set of LGCs for one direction until throughput
//! stabilises, per the saturation algorithm in spec.md §4.2.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::SystemTime;

use futures::future::join_all;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::time;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::core::connection::{HttpLgc, LoadGeneratingConnection};
use crate::core::constants::{
    ADD_FLOWS_STEP, INSTABILITY_MOVING_AVERAGE_INTERVAL_COUNT, MEASUREMENT_INTERVAL, STABILITY_DELTA,
};
use crate::core::self_prober::SelfProber;
use crate::core::types::{Direction, ProbeDataPoint, SelfDataCollectionResult, ThroughputDataPoint};
use crate::logging::DebugLogger;

pub struct FlowGroupConfig {
    pub add_flows_step: usize,
    pub instability_window: usize,
    pub stability_delta: f64,
    pub measurement_interval: std::time::Duration,
}

impl Default for FlowGroupConfig {
    fn default() -> Self {
        Self {
            add_flows_step: ADD_FLOWS_STEP,
            instability_window: INSTABILITY_MOVING_AVERAGE_INTERVAL_COUNT,
            stability_delta: STABILITY_DELTA,
            measurement_interval: MEASUREMENT_INTERVAL,
        }
    }
}

pub struct FlowGroup {
    direction: Direction,
    load_url: Url,
    small_path: String,
    tls_config: Arc<rustls::ClientConfig>,
    config: FlowGroupConfig,
    lgcs: Arc<Mutex<Vec<Arc<dyn LoadGeneratingConnection>>>>,
    self_probes: Arc<Mutex<Vec<ProbeDataPoint>>>,
    logger: DebugLogger,
}

/// Handles returned by `FlowGroup::spawn`, used by the RPMController to
/// await completion/result and to keep draining throughput samples.
pub struct FlowGroupHandles {
    pub complete_rx: oneshot::Receiver<bool>,
    pub result_rx: oneshot::Receiver<SelfDataCollectionResult>,
    pub throughput_rx: mpsc::UnboundedReceiver<ThroughputDataPoint>,
}

impl FlowGroup {
    pub fn new(
        direction: Direction,
        load_url: Url,
        small_path: String,
        tls_config: Arc<rustls::ClientConfig>,
        config: FlowGroupConfig,
        logger: DebugLogger,
    ) -> Self {
        Self {
            direction,
            load_url,
            small_path,
            tls_config,
            config,
            lgcs: Arc::new(Mutex::new(Vec::new())),
            self_probes: Arc::new(Mutex::new(Vec::new())),
            logger,
        }
    }

    async fn spawn_flows(&self, n: usize) {
        let mut created = Vec::with_capacity(n);
        for _ in 0..n {
            let lgc: Arc<dyn LoadGeneratingConnection> = Arc::new(HttpLgc::new(
                self.direction,
                self.load_url.clone(),
                self.tls_config.clone(),
                self.logger.clone(),
            ));
            created.push(lgc);
        }

        // "wait until at least one is in TransferringBytes" — start()
        // returns only once the transport is up, so joining all starts
        // satisfies this; LGCs that fail to dial are dropped from the live
        // set (error policy: mark invalid, FlowGroup continues with
        // survivors).
        let results = join_all(created.iter().map(|lgc| lgc.start())).await;

        let mut guard = self.lgcs.lock().await;
        for (lgc, result) in created.into_iter().zip(results) {
            if result.is_ok() {
                guard.push(lgc);
            }
        }
    }

    fn total_bytes(lgcs: &[Arc<dyn LoadGeneratingConnection>]) -> u64 {
        lgcs.iter().map(|l| l.transferred()).sum()
    }

    /// Drives the saturation loop and staged shutdown observation for this
    /// FlowGroup. `data_scope` cancellation stops sample emission (stage 3);
    /// `network_scope` cancellation closes the LGCs, done by the controller
    /// in stage 7, not by the FlowGroup itself.
    pub fn spawn(self: Arc<Self>, data_scope: CancellationToken, network_scope: CancellationToken) -> FlowGroupHandles {
        let (complete_tx, complete_rx) = oneshot::channel();
        let (result_tx, result_rx) = oneshot::channel();
        let (throughput_tx, throughput_rx) = mpsc::unbounded_channel();
        let (self_probe_tx, mut self_probe_rx) = mpsc::unbounded_channel();

        let collected = self.self_probes.clone();
        tokio::spawn(async move {
            while let Some(point) = self_probe_rx.recv().await {
                collected.lock().await.push(point);
            }
        });

        let prober_scope = data_scope.clone();
        let prober_lgcs = self.lgcs.clone();
        let prober = SelfProber::new(self.small_path.clone());
        tokio::spawn(async move {
            prober.run(prober_scope, prober_lgcs, self_probe_tx).await;
        });

        tokio::spawn(async move {
            self.run_saturation_loop(data_scope, network_scope, complete_tx, result_tx, throughput_tx)
                .await;
        });

        FlowGroupHandles {
            complete_rx,
            result_rx,
            throughput_rx,
        }
    }

    async fn run_saturation_loop(
        self: Arc<Self>,
        data_scope: CancellationToken,
        network_scope: CancellationToken,
        complete_tx: oneshot::Sender<bool>,
        result_tx: oneshot::Sender<SelfDataCollectionResult>,
        throughput_tx: mpsc::UnboundedSender<ThroughputDataPoint>,
    ) {
        self.spawn_flows(self.config.add_flows_step).await;

        let mut window: VecDeque<f64> = VecDeque::with_capacity(self.config.instability_window);
        let mut last_total: u64 = Self::total_bytes(&self.lgcs.lock().await);
        let mut ticker = time::interval(self.config.measurement_interval);
        // `interval` fires immediately on the first tick; consume it so the
        // first real measurement happens after one full interval.
        ticker.tick().await;

        let fully_complete = loop {
            tokio::select! {
                _ = data_scope.cancelled() => {
                    break false;
                }
                _ = ticker.tick() => {
                    let total = {
                        let guard = self.lgcs.lock().await;
                        Self::total_bytes(&guard)
                    };
                    let delta = total.saturating_sub(last_total);
                    last_total = total;
                    let secs = self.config.measurement_interval.as_secs_f64();
                    let bytes_per_sec = delta as f64 / secs;

                    let flow_count = self.lgcs.lock().await.len();
                    let _ = throughput_tx.send(ThroughputDataPoint {
                        at: SystemTime::now(),
                        bytes_per_sec,
                        flow_count,
                    });
                    self.logger.saturation_progress(self.direction.as_str(), flow_count, bytes_per_sec);

                    let window_was_full = window.len() == self.config.instability_window;
                    let ma_prev = if window_was_full {
                        Some(average(window.iter().take(self.config.instability_window.saturating_sub(1))))
                    } else {
                        None
                    };

                    window.push_back(bytes_per_sec);
                    if window.len() > self.config.instability_window {
                        window.pop_front();
                    }

                    if window.len() == self.config.instability_window {
                        let ma_n = average(window.iter());
                        let ma_prev = ma_prev.unwrap_or(ma_n);
                        let delta_ratio = if ma_n.abs() > f64::EPSILON {
                            (ma_n - ma_prev).abs() / ma_n
                        } else {
                            0.0
                        };

                        if delta_ratio < self.config.stability_delta {
                            break true;
                        }
                    }

                    self.spawn_flows(self.config.add_flows_step).await;
                }
            }
        };

        self.logger.saturation_declared(self.direction.as_str(), fully_complete);
        let _ = complete_tx.send(fully_complete);

        // Stage 3 has fired (data_scope cancelled, or we declared
        // saturation ourselves; the controller cancels data_scope for the
        // sibling FlowGroup next). network_scope only closes in stage 7, so
        // live_lgcs' sockets are still readable when this result is built.
        let _ = &network_scope;

        let (final_rate, live_lgcs) = {
            let guard = self.lgcs.lock().await;
            (average(window.iter()), guard.clone())
        };
        let self_probes = std::mem::take(&mut *self.self_probes.lock().await);

        let result = SelfDataCollectionResult {
            direction: self.direction,
            final_rate,
            live_lgcs,
            self_probes,
            fully_complete,
        };
        let _ = result_tx.send(result);
    }
}

fn average<'a>(values: impl Iterator<Item = &'a f64>) -> f64 {
    let mut sum = 0.0;
    let mut count = 0usize;
    for v in values {
        sum += v;
        count += 1;
    }
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn average_of_empty_iter_is_zero() {
        let v: Vec<f64> = Vec::new();
        assert_eq!(average(v.iter()), 0.0);
    }

    #[test]
    fn average_of_constant_stream_is_the_constant() {
        let v = vec![10.0, 10.0, 10.0, 10.0];
        assert_eq!(average(v.iter()), 10.0);
    }

    #[tokio::test(start_paused = true)]
    async fn saturation_hysteresis_declares_on_the_nth_constant_sample() {
        // Exercises the moving-average check in isolation, independent of
        // real LGCs/networking, per testable property 3.
        let config = FlowGroupConfig {
            add_flows_step: 0,
            instability_window: 4,
            stability_delta: 0.05,
            measurement_interval: std::time::Duration::from_millis(10),
        };
        let mut window: VecDeque<f64> = VecDeque::with_capacity(config.instability_window);
        let constant = 100.0;
        let mut declared_at = None;

        for sample_index in 1..=6 {
            let window_was_full = window.len() == config.instability_window;
            let ma_prev = if window_was_full {
                Some(average(window.iter().take(config.instability_window - 1)))
            } else {
                None
            };
            window.push_back(constant);
            if window.len() > config.instability_window {
                window.pop_front();
            }
            if window.len() == config.instability_window {
                let ma_n = average(window.iter());
                let ma_prev = ma_prev.unwrap_or(ma_n);
                let delta_ratio = (ma_n - ma_prev).abs() / ma_n;
                if delta_ratio < config.stability_delta && declared_at.is_none() {
                    declared_at = Some(sample_index);
                }
            }
        }

        assert_eq!(declared_at, Some(config.instability_window));
    }
}
