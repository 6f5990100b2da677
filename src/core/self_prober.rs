//! SelfProber: periodically issues a small request on a designated
//! saturating LGC, reusing its underlying connection.

use std::sync::Arc;
use std::time::SystemTime;

use tokio::sync::{mpsc, Mutex};
use tokio::time;
use tokio_util::sync::CancellationToken;

use crate::core::connection::LoadGeneratingConnection;
use crate::core::constants::PROBE_INTERVAL;
use crate::core::types::{ProbeDataPoint, ProbeKind};

pub struct SelfProber {
    small_path: String,
}

impl SelfProber {
    pub fn new(small_path: String) -> Self {
        Self { small_path }
    }

    /// Runs until `scope` is cancelled. `lgcs` is the FlowGroup's live list;
    /// the designated LGC is the first healthy one, re-selected every tick
    /// if it has become invalid.
    pub async fn run(
        &self,
        scope: CancellationToken,
        lgcs: Arc<Mutex<Vec<Arc<dyn LoadGeneratingConnection>>>>,
        out: mpsc::UnboundedSender<ProbeDataPoint>,
    ) {
        let mut ticker = time::interval(PROBE_INTERVAL);
        loop {
            tokio::select! {
                _ = scope.cancelled() => return,
                _ = ticker.tick() => {
                    let designated = {
                        let guard = lgcs.lock().await;
                        guard.iter().find(|l| l.is_valid()).cloned()
                    };
                    let Some(lgc) = designated else { continue };

                    let start = SystemTime::now();
                    if let Some(duration) = lgc.probe(&self.small_path).await {
                        // A cancellation observed mid-probe still completed
                        // the measurement; per spec, at most one final
                        // measurement may flush after cancellation.
                        if scope.is_cancelled() {
                            return;
                        }
                        let point = ProbeDataPoint {
                            start,
                            duration,
                            round_trips: 1,
                            kind: ProbeKind::SelfProbe,
                        };
                        let _ = out.send(point);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{Direction, FlowStats};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    struct FakeLgc {
        valid: AtomicBool,
        probe_delay: Duration,
        probes_served: AtomicUsize,
    }

    #[async_trait]
    impl LoadGeneratingConnection for FakeLgc {
        async fn start(&self) -> crate::error::Result<()> {
            Ok(())
        }
        fn transferred(&self) -> u64 {
            0
        }
        fn is_valid(&self) -> bool {
            self.valid.load(Ordering::SeqCst)
        }
        fn stats(&self) -> FlowStats {
            FlowStats {
                bytes_transferred: 0,
                extended: None,
            }
        }
        async fn close(&self) {}
        fn direction(&self) -> Direction {
            Direction::Download
        }
        async fn probe(&self, _path: &str) -> Option<Duration> {
            self.probes_served.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.probe_delay).await;
            Some(self.probe_delay)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn re_selects_when_designated_lgc_becomes_invalid() {
        let healthy: Arc<dyn LoadGeneratingConnection> = Arc::new(FakeLgc {
            valid: AtomicBool::new(false),
            probe_delay: Duration::from_millis(1),
            probes_served: AtomicUsize::new(0),
        });
        let backup: Arc<dyn LoadGeneratingConnection> = Arc::new(FakeLgc {
            valid: AtomicBool::new(true),
            probe_delay: Duration::from_millis(1),
            probes_served: AtomicUsize::new(0),
        });

        let lgcs = Arc::new(Mutex::new(vec![healthy, backup.clone()]));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let scope = CancellationToken::new();

        let prober = SelfProber::new("/small".to_string());
        let scope_clone = scope.clone();
        let handle = tokio::spawn(async move {
            prober.run(scope_clone, lgcs, tx).await;
        });

        tokio::time::advance(Duration::from_millis(250)).await;
        scope.cancel();
        handle.await.unwrap();

        let mut count = 0;
        while rx.try_recv().is_ok() {
            count += 1;
        }
        assert!(count >= 1);
    }
}
