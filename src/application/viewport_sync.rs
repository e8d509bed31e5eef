use serde::Serialize;

use crate::application::backfill::CancellationToken;
use crate::domain::chart::{ChartPane, Viewport};
use crate::domain::logging::LogComponent;
use crate::log_debug;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SyncState {
    Idle,
    /// Waiting for interaction to settle
    Interacting { deadline_ms: f64 },
    /// Settled viewport handed out for gap detection / backfill
    GapChecking,
}

/// Immediate fan-out of one pane's relayout to its siblings
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViewportBroadcast {
    pub source: ChartPane,
    /// `None` is an autorange reset
    pub viewport: Option<Viewport>,
    pub targets: Vec<ChartPane>,
}

/// Debounce and cancellation record for one group of linked panes.
///
/// Holds no timers itself: the caller passes the clock to every call and
/// polls after [`ViewportSynchronizer::next_deadline`].
#[derive(Debug)]
pub struct ViewportSynchronizer {
    state: SyncState,
    debounce_ms: f64,
    linked: Vec<ChartPane>,
    viewport: Option<Viewport>,
    generation: u64,
    token: Option<CancellationToken>,
}

impl ViewportSynchronizer {
    pub fn new(debounce_ms: u64, linked: Vec<ChartPane>) -> Self {
        Self {
            state: SyncState::Idle,
            debounce_ms: debounce_ms as f64,
            linked,
            viewport: None,
            generation: 0,
            token: None,
        }
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    pub fn viewport(&self) -> Option<Viewport> {
        self.viewport
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn next_deadline(&self) -> Option<f64> {
        match self.state {
            SyncState::Interacting { deadline_ms } => Some(deadline_ms),
            _ => None,
        }
    }

    /// Records the viewport, drops any pending check or in-flight batch and
    /// restarts the debounce. Autorange resets skip the gap check.
    pub fn on_relayout(&mut self, source: ChartPane, viewport: Option<Viewport>, now_ms: f64) -> ViewportBroadcast {
        self.cancel_in_flight();
        self.viewport = viewport;
        self.state = match viewport {
            Some(_) => SyncState::Interacting { deadline_ms: now_ms + self.debounce_ms },
            None => SyncState::Idle,
        };

        let targets = self.linked.iter().copied().filter(|pane| *pane != source).collect();
        ViewportBroadcast { source, viewport: viewport.map(|v| v.time_only()), targets }
    }

    /// Yields the settled viewport exactly once per quiet period.
    pub fn poll(&mut self, now_ms: f64) -> Option<Viewport> {
        match self.state {
            SyncState::Interacting { deadline_ms } if now_ms >= deadline_ms => {
                self.state = SyncState::GapChecking;
                log_debug!(LogComponent::Application("ViewportSync"), "settled at {}ms", now_ms);
                self.viewport
            }
            _ => None,
        }
    }

    /// Fresh token for the batch issued by the current gap check
    pub fn begin_fetch(&mut self) -> CancellationToken {
        self.cancel_in_flight();
        self.generation += 1;
        let token = CancellationToken::new(self.generation);
        self.token = Some(token.clone());
        token
    }

    /// True while `generation` is the batch this synchronizer is waiting on
    pub fn is_current(&self, generation: u64) -> bool {
        self.state == SyncState::GapChecking
            && self.token.as_ref().is_some_and(|t| t.generation() == generation && !t.is_cancelled())
    }

    /// Closes the round for `generation`; `false` means the result is stale.
    pub fn finish(&mut self, generation: u64) -> bool {
        if !self.is_current(generation) {
            return false;
        }
        self.token = None;
        self.state = SyncState::Idle;
        true
    }

    /// Gap check found nothing to fetch
    pub fn settle(&mut self) {
        if self.state == SyncState::GapChecking {
            self.state = SyncState::Idle;
        }
    }

    pub fn reset(&mut self) {
        self.cancel_in_flight();
        self.viewport = None;
        self.state = SyncState::Idle;
    }

    fn cancel_in_flight(&mut self) {
        if let Some(token) = self.token.take() {
            log_debug!(
                LogComponent::Application("ViewportSync"),
                "cancelling batch {}",
                token.generation()
            );
            token.cancel();
        }
    }
}
