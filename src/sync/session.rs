//! Per-tab driver: starts a cycle on every load and restarts it after an
//! in-place (`replace`) navigation.
//!
//! At most one cycle runs at a time. A new trigger cancels the running cycle
//! and waits for it to wind down before anything else touches the page.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use super::cycle::{Cycle, CycleContext, CycleError, CycleOutcome};
use super::ui;
use crate::core::config::DEFAULT_SETTLE_DELAY_MS;
use crate::scraping::poller::pause;
use crate::scraping::{NavigationKind, PageEvent};

/// How one cycle ended.
#[derive(Debug)]
pub struct CycleRecord {
    pub id: String,
    pub result: Result<CycleOutcome, CycleError>,
}

/// Cycles kept in [`SessionReport::recent`].
pub const RECENT_CYCLES: usize = 16;

/// Tally of every finished cycle plus the last [`RECENT_CYCLES`] records.
#[derive(Debug, Default)]
pub struct SessionReport {
    pub finished: usize,
    pub completed: usize,
    pub cancelled: usize,
    pub failed: usize,
    recent: VecDeque<CycleRecord>,
}

impl SessionReport {
    fn record(&mut self, record: CycleRecord) {
        self.finished += 1;
        match &record.result {
            Ok(_) => self.completed += 1,
            Err(CycleError::Cancelled) => self.cancelled += 1,
            Err(_) => self.failed += 1,
        }
        if self.recent.len() == RECENT_CYCLES {
            self.recent.pop_front();
        }
        self.recent.push_back(record);
    }

    /// Most recent records, oldest first.
    pub fn recent(&self) -> impl ExactSizeIterator<Item = &CycleRecord> {
        self.recent.iter()
    }
}

struct RunningCycle {
    cancel: CancellationToken,
    handle: JoinHandle<CycleRecord>,
}

pub struct PageSession {
    cycle: Arc<Cycle>,
    settle_delay: Duration,
}

impl PageSession {
    pub fn new(cycle: Arc<Cycle>) -> Self {
        Self {
            cycle,
            settle_delay: Duration::from_millis(DEFAULT_SETTLE_DELAY_MS),
        }
    }

    /// Delay between a `replace` navigation and the next cycle, letting the
    /// new profile render.
    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    /// Drive cycles from `events` until the channel closes or `shutdown`
    /// fires.
    pub async fn run(
        &self,
        mut events: mpsc::Receiver<PageEvent>,
        shutdown: CancellationToken,
    ) -> SessionReport {
        let mut report = SessionReport::default();
        let mut current: Option<RunningCycle> = None;

        loop {
            let event = tokio::select! {
                _ = shutdown.cancelled() => break,
                event = events.recv() => event,
            };
            let Some(event) = event else {
                debug!("session: event stream closed");
                break;
            };

            match event {
                PageEvent::Load => {
                    if let Some(record) = stop(current.take()).await {
                        report.record(record);
                    }
                    current = Some(self.start(Duration::ZERO));
                }
                PageEvent::Navigate(NavigationKind::Replace) => {
                    if let Some(record) = stop(current.take()).await {
                        report.record(record);
                    }
                    if let Err(e) = ui::remove_all(self.cycle.page().as_ref()).await {
                        warn!("session: could not remove injected markup: {}", e);
                    }
                    current = Some(self.start(self.settle_delay));
                }
                PageEvent::Navigate(kind) => debug!("session: ignoring {:?} navigation", kind),
            }
        }

        if let Some(record) = stop(current.take()).await {
            report.record(record);
        }
        info!("session: 🛑 stopped after {} cycle(s)", report.finished);
        report
    }

    fn start(&self, delay: Duration) -> RunningCycle {
        let cancel = CancellationToken::new();
        let mut ctx = CycleContext::new(cancel.clone());
        let cycle = Arc::clone(&self.cycle);
        let span = info_span!("cycle", id = %ctx.id);

        let handle = tokio::spawn(
            async move {
                let result = match pause(delay, Some(&ctx.cancel)).await {
                    Ok(()) => cycle.run(&mut ctx).await,
                    Err(_) => Err(CycleError::Cancelled),
                };
                CycleRecord { id: ctx.id, result }
            }
            .instrument(span),
        );
        RunningCycle { cancel, handle }
    }
}

async fn stop(running: Option<RunningCycle>) -> Option<CycleRecord> {
    let running = running?;
    running.cancel.cancel();
    match running.handle.await {
        Ok(record) => Some(record),
        Err(e) => {
            warn!("session: cycle task failed: {}", e);
            None
        }
    }
}
