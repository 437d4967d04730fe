// =============================================================================
// AutoTrader scheduler — fixed-interval cycles gated on market hours
// =============================================================================
//
// A single background task owns the ticks; each tick runs one cycle to
// completion before the next may start (late ticks coalesce). `stop()`
// cancels the timer but an in-flight cycle always finishes: the stop signal
// is only observed between ticks.
//
// Every tick appends to a bounded history ring — including gated-out ticks
// (status `skipped`) and failed cycles (status `error`), so the next tick
// still fires after a failure.
// =============================================================================

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::error::{AppError, AppResult};
use crate::market_hours;
use crate::trader::AutoTrader;
use crate::types::{CycleRecord, CycleStatus};

/// Cycle-history ring capacity; oldest entries evicted on overflow.
const MAX_HISTORY: usize = 100;

const MIN_INTERVAL_MINUTES: u32 = 1;
const MAX_INTERVAL_MINUTES: u32 = 480;

const KR_MARKET_HOURS: &str = "09:00-15:30 KST";
const US_MARKET_HOURS: &str = "23:30-06:00 KST";

fn interval_delta(interval: Duration) -> chrono::Duration {
    chrono::Duration::from_std(interval).unwrap_or_else(|_| chrono::Duration::zero())
}

/// Gating rule for one tick. With both market flags off the scheduler runs
/// unconditionally.
pub fn should_run(kr_market_only: bool, us_market: bool, kr_open: bool, us_open: bool) -> bool {
    (kr_market_only && kr_open) || (us_market && us_open) || (!kr_market_only && !us_market)
}

struct SchedulerInner {
    running: bool,
    interval_minutes: u32,
    kr_market_only: bool,
    us_market: bool,
    next_run_at: Option<DateTime<Utc>>,
    stop_tx: Option<watch::Sender<bool>>,
}

/// Status snapshot returned by the control surface.
#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStatus {
    pub is_running: bool,
    pub interval_minutes: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_run_time: Option<String>,
    pub total_cycles: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_cycle_result: Option<CycleRecord>,
    pub kr_market_hours: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub us_market_hours: Option<&'static str>,
}

/// Singleton scheduler wrapping the trading engine.
pub struct AutoTraderScheduler {
    trader: Arc<AutoTrader>,
    inner: Mutex<SchedulerInner>,
    history: Mutex<VecDeque<CycleRecord>>,
}

impl AutoTraderScheduler {
    pub fn new(trader: Arc<AutoTrader>) -> Self {
        Self {
            trader,
            inner: Mutex::new(SchedulerInner {
                running: false,
                interval_minutes: 30,
                kr_market_only: true,
                us_market: false,
                next_run_at: None,
                stop_tx: None,
            }),
            history: Mutex::new(VecDeque::with_capacity(MAX_HISTORY)),
        }
    }

    // -------------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------------

    /// Start the periodic trigger. No-op when already running.
    pub fn start(
        self: Arc<Self>,
        interval_minutes: u32,
        kr_market_only: bool,
        us_market: bool,
    ) -> AppResult<()> {
        if !(MIN_INTERVAL_MINUTES..=MAX_INTERVAL_MINUTES).contains(&interval_minutes) {
            return Err(AppError::validation_with(
                "interval_minutes must be between 1 and 480",
                serde_json::json!({ "interval_minutes": interval_minutes }),
            ));
        }

        let mut inner = self.inner.lock();
        if inner.running {
            warn!("scheduler already running");
            return Ok(());
        }

        let (stop_tx, stop_rx) = watch::channel(false);
        let interval = Duration::from_secs(u64::from(interval_minutes) * 60);

        inner.running = true;
        inner.interval_minutes = interval_minutes;
        inner.kr_market_only = kr_market_only;
        inner.us_market = us_market;
        inner.next_run_at = Some(Utc::now() + interval_delta(interval));
        inner.stop_tx = Some(stop_tx);
        drop(inner);

        let scheduler = Arc::clone(&self);
        tokio::spawn(async move {
            scheduler.run_loop(interval, stop_rx).await;
        });

        info!(
            interval_minutes,
            kr_market_only, us_market, "auto-trader scheduler started"
        );
        Ok(())
    }

    /// Stop the periodic trigger. The in-flight cycle, if any, completes;
    /// history is retained. No-op when already stopped.
    pub fn stop(&self) {
        let mut inner = self.inner.lock();
        if !inner.running {
            warn!("scheduler is not running");
            return;
        }
        if let Some(stop_tx) = inner.stop_tx.take() {
            let _ = stop_tx.send(true);
        }
        inner.running = false;
        inner.next_run_at = None;
        info!("auto-trader scheduler stopped");
    }

    async fn run_loop(self: Arc<Self>, interval: Duration, mut stop_rx: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
        // A tick delayed past its slot coalesces instead of bursting.
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = stop_rx.changed() => break,
            }
            if *stop_rx.borrow() {
                break;
            }

            self.inner.lock().next_run_at = Some(Utc::now() + interval_delta(interval));
            self.run_scheduled_cycle().await;
        }
        info!("scheduler loop exited");
    }

    // -------------------------------------------------------------------------
    // Tick execution
    // -------------------------------------------------------------------------

    /// Execute one scheduled tick at the current KST time.
    pub async fn run_scheduled_cycle(&self) -> CycleRecord {
        self.run_scheduled_cycle_at(market_hours::now_kst()).await
    }

    /// Execute one scheduled tick as of the given KST instant: gate on market
    /// hours, run the cycle, append the outcome to history.
    pub async fn run_scheduled_cycle_at(&self, now: DateTime<chrono_tz::Tz>) -> CycleRecord {
        let kr_open = market_hours::is_kr_market_open_at(now);
        let us_open = market_hours::is_us_market_open_at(now);
        let (kr_market_only, us_market) = {
            let inner = self.inner.lock();
            (inner.kr_market_only, inner.us_market)
        };

        if !should_run(kr_market_only, us_market, kr_open, us_open) {
            info!(kr_open, us_open, "market closed, skipping cycle");
            let record = CycleRecord {
                timestamp: now.to_rfc3339(),
                status: CycleStatus::Skipped,
                kr_market_open: kr_open,
                us_market_open: us_open,
                reason: Some("market closed".to_string()),
                cycle_result: None,
                error: None,
            };
            self.append_history(record.clone());
            return record;
        }

        let record = match self.trader.run_cycle().await {
            Ok(result) => {
                info!(
                    scanned = result.scanned,
                    buys = result.buy_signals.len(),
                    sells = result.sell_signals.len(),
                    "scheduled cycle complete"
                );
                CycleRecord {
                    timestamp: now.to_rfc3339(),
                    status: CycleStatus::Completed,
                    kr_market_open: kr_open,
                    us_market_open: us_open,
                    reason: None,
                    cycle_result: Some(result),
                    error: None,
                }
            }
            Err(err) => {
                warn!(error = %err, "scheduled cycle failed");
                CycleRecord {
                    timestamp: now.to_rfc3339(),
                    status: CycleStatus::Error,
                    kr_market_open: kr_open,
                    us_market_open: us_open,
                    reason: None,
                    cycle_result: None,
                    error: Some(err.to_string()),
                }
            }
        };

        self.append_history(record.clone());
        record
    }

    // -------------------------------------------------------------------------
    // History / status
    // -------------------------------------------------------------------------

    fn append_history(&self, record: CycleRecord) {
        let mut history = self.history.lock();
        history.push_back(record);
        while history.len() > MAX_HISTORY {
            history.pop_front();
        }
    }

    /// Most recent records, newest first.
    pub fn history(&self, limit: usize) -> Vec<CycleRecord> {
        let history = self.history.lock();
        history.iter().rev().take(limit).cloned().collect()
    }

    pub fn status(&self) -> SchedulerStatus {
        let inner = self.inner.lock();
        let history = self.history.lock();
        SchedulerStatus {
            is_running: inner.running,
            interval_minutes: inner.interval_minutes,
            next_run_time: inner.next_run_at.map(|t| t.to_rfc3339()),
            total_cycles: history.len(),
            last_cycle_result: history.back().cloned(),
            kr_market_hours: KR_MARKET_HOURS,
            us_market_hours: if inner.us_market { Some(US_MARKET_HOURS) } else { None },
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AutoTraderConfig;
    use crate::testutil::{MockBroker, MockSentimentFeed};
    use crate::universe::UniverseManager;
    use arc_swap::ArcSwap;
    use chrono::TimeZone;
    use chrono_tz::Asia::Seoul;

    fn kst(day: u32, h: u32, m: u32) -> DateTime<chrono_tz::Tz> {
        // January 2024: the 1st was a Monday, the 3rd a Wednesday, the 6th a
        // Saturday.
        Seoul.with_ymd_and_hms(2024, 1, day, h, m, 0).unwrap()
    }

    fn make_scheduler() -> (Arc<AutoTraderScheduler>, Arc<MockBroker>) {
        let broker = Arc::new(MockBroker::new());
        let universe = Arc::new(UniverseManager::new());
        universe.create("empty", Vec::new(), "no symbols");
        let mut cfg = AutoTraderConfig::default();
        cfg.universe_name = "empty".into();
        let trader = Arc::new(AutoTrader::new(
            broker.clone(),
            Arc::new(MockSentimentFeed::with_score(50)),
            universe,
            Arc::new(ArcSwap::from_pointee(cfg)),
        ));
        (Arc::new(AutoTraderScheduler::new(trader)), broker)
    }

    #[test]
    fn gating_rule() {
        // KR-only follows the KR session.
        assert!(should_run(true, false, true, false));
        assert!(!should_run(true, false, false, true));
        // US flag follows the US session.
        assert!(should_run(false, true, false, true));
        assert!(!should_run(false, true, false, false));
        // Either flag open is enough when both are set.
        assert!(should_run(true, true, false, true));
        // Both flags off: always run.
        assert!(should_run(false, false, false, false));
    }

    #[tokio::test]
    async fn saturday_tick_is_skipped_without_running_the_trader() {
        let (scheduler, broker) = make_scheduler();
        scheduler.clone().start(1, true, false).unwrap();

        let record = scheduler.run_scheduled_cycle_at(kst(6, 10, 0)).await;
        assert_eq!(record.status, CycleStatus::Skipped);
        assert_eq!(record.reason.as_deref(), Some("market closed"));
        assert!(!record.kr_market_open);
        // The trading engine was never invoked.
        assert_eq!(broker.quote_calls(), 0);

        let status = scheduler.status();
        assert_eq!(status.total_cycles, 1);
        assert_eq!(status.last_cycle_result.unwrap().status, CycleStatus::Skipped);
        scheduler.stop();
    }

    #[tokio::test]
    async fn open_market_tick_completes_a_cycle() {
        let (scheduler, _broker) = make_scheduler();
        scheduler.clone().start(30, true, false).unwrap();

        let record = scheduler.run_scheduled_cycle_at(kst(3, 10, 0)).await;
        assert_eq!(record.status, CycleStatus::Completed);
        assert!(record.kr_market_open);
        let result = record.cycle_result.unwrap();
        assert_eq!(result.scanned, 0);
        scheduler.stop();
    }

    #[tokio::test]
    async fn start_validates_interval() {
        let (scheduler, _) = make_scheduler();
        assert!(scheduler.clone().start(0, true, false).is_err());
        assert!(scheduler.clone().start(481, true, false).is_err());
        assert!(scheduler.clone().start(480, true, false).is_ok());
        scheduler.stop();
    }

    #[tokio::test]
    async fn start_twice_is_a_noop() {
        let (scheduler, _) = make_scheduler();
        scheduler.clone().start(30, true, false).unwrap();
        // The second start must not replace the interval.
        scheduler.clone().start(5, false, true).unwrap();
        let status = scheduler.status();
        assert!(status.is_running);
        assert_eq!(status.interval_minutes, 30);
        scheduler.stop();
    }

    #[tokio::test]
    async fn stop_when_stopped_is_a_noop_and_history_survives() {
        let (scheduler, _) = make_scheduler();
        scheduler.clone().start(30, true, false).unwrap();
        scheduler.run_scheduled_cycle_at(kst(6, 10, 0)).await;
        scheduler.stop();
        scheduler.stop();

        let status = scheduler.status();
        assert!(!status.is_running);
        assert!(status.next_run_time.is_none());
        assert_eq!(status.total_cycles, 1);
    }

    #[tokio::test]
    async fn history_ring_is_bounded() {
        let (scheduler, _) = make_scheduler();
        scheduler.clone().start(30, true, false).unwrap();
        for _ in 0..105 {
            scheduler.run_scheduled_cycle_at(kst(6, 10, 0)).await;
        }
        assert_eq!(scheduler.status().total_cycles, MAX_HISTORY);
        assert_eq!(scheduler.history(200).len(), MAX_HISTORY);
        scheduler.stop();
    }

    #[tokio::test]
    async fn history_is_newest_first_and_limited() {
        let (scheduler, _) = make_scheduler();
        scheduler.clone().start(30, true, false).unwrap();
        scheduler.run_scheduled_cycle_at(kst(6, 10, 0)).await;
        scheduler.run_scheduled_cycle_at(kst(6, 11, 0)).await;
        scheduler.run_scheduled_cycle_at(kst(6, 12, 0)).await;

        let recent = scheduler.history(2);
        assert_eq!(recent.len(), 2);
        assert!(recent[0].timestamp > recent[1].timestamp);
        scheduler.stop();
    }

    #[tokio::test]
    async fn status_reports_us_hours_only_when_enabled() {
        let (scheduler, _) = make_scheduler();
        assert_eq!(scheduler.status().us_market_hours, None);

        scheduler.clone().start(30, false, true).unwrap();
        let status = scheduler.status();
        assert_eq!(status.us_market_hours, Some(US_MARKET_HOURS));
        assert_eq!(status.kr_market_hours, KR_MARKET_HOURS);
        assert!(status.next_run_time.is_some());
        scheduler.stop();
    }

    #[tokio::test]
    async fn us_enabled_runs_in_the_us_window() {
        let (scheduler, _) = make_scheduler();
        scheduler.clone().start(30, false, true).unwrap();

        // Wednesday 23:45 KST is inside the US session.
        let record = scheduler.run_scheduled_cycle_at(kst(3, 23, 45)).await;
        assert_eq!(record.status, CycleStatus::Completed);
        assert!(record.us_market_open);

        // Monday 03:00 KST is Sunday in New York.
        let record = scheduler.run_scheduled_cycle_at(kst(1, 3, 0)).await;
        assert_eq!(record.status, CycleStatus::Skipped);
        scheduler.stop();
    }
}
