use std::future::Future;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::{AbortHandle, AbortRegistration, Abortable, join_all};

use crate::domain::chart::{Gap, TimeRange};
use crate::domain::errors::AppError;
use crate::domain::logging::LogComponent;
use crate::domain::market_data::{Candle, InstrumentId, TimeInterval, TradingHours};
use crate::infrastructure::dto::normalize_response;
use crate::infrastructure::http::{OhlcvQuery, OhlcvTransport};
use crate::{log_debug, log_info, log_warn};

/// Async wait used for the rate-limit backoff
#[allow(async_fn_in_trait)]
pub trait Sleeper {
    async fn sleep(&self, duration: Duration);
}

/// Shared cancel switch for every request issued in one gap-check round.
///
/// Clones observe the same state. Futures attached after `cancel` start
/// out aborted.
#[derive(Debug, Clone)]
pub struct CancellationToken {
    generation: u64,
    cancelled: Arc<AtomicBool>,
    handles: Arc<Mutex<Vec<AbortHandle>>>,
}

impl CancellationToken {
    pub fn new(generation: u64) -> Self {
        Self {
            generation,
            cancelled: Arc::new(AtomicBool::new(false)),
            handles: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn attach(&self) -> AbortRegistration {
        let (handle, registration) = AbortHandle::new_pair();
        if self.is_cancelled() {
            handle.abort();
        } else if let Ok(mut handles) = self.handles.lock() {
            handles.push(handle);
        }
        registration
    }

    pub fn cancel(&self) {
        if self.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Ok(mut handles) = self.handles.lock() {
            for handle in handles.drain(..) {
                handle.abort();
            }
        }
    }
}

/// What one batch produced
#[derive(Debug, Clone, PartialEq)]
pub struct BatchOutcome {
    pub generation: u64,
    pub points: Vec<Candle>,
    /// Hull of the gaps that returned data
    pub served: Option<TimeRange>,
    pub requested: usize,
    pub skipped: usize,
    pub cancelled: bool,
}

impl BatchOutcome {
    fn skipped_all(generation: u64, skipped: usize) -> Self {
        Self { generation, points: Vec::new(), served: None, requested: 0, skipped, cancelled: false }
    }
}

/// Static request settings shared by every gap request
#[derive(Debug, Clone, PartialEq)]
pub struct FetchSettings {
    pub base_url: String,
    pub exchange: String,
    pub rate_limit_backoff: Duration,
    pub trading_hours: TradingHours,
}

/// Turns gaps into cancellable, deduplicated range requests
pub struct BackfillFetcher<T, S> {
    transport: Rc<T>,
    sleeper: Rc<S>,
    settings: Rc<FetchSettings>,
    last_served: Option<TimeRange>,
}

impl<T, S> BackfillFetcher<T, S>
where
    T: OhlcvTransport + 'static,
    S: Sleeper + 'static,
{
    pub fn new(transport: Rc<T>, sleeper: Rc<S>, settings: FetchSettings) -> Self {
        Self { transport, sleeper, settings: Rc::new(settings), last_served: None }
    }

    pub fn last_served(&self) -> Option<TimeRange> {
        self.last_served
    }

    pub fn reset(&mut self) {
        self.last_served = None;
    }

    /// Gaps not already covered by the last served range
    pub fn plan(&self, gaps: &[Gap]) -> Vec<Gap> {
        gaps.iter()
            .filter(|gap| !self.last_served.is_some_and(|served| served.contains_range(&gap.range())))
            .copied()
            .collect()
    }

    /// Builds the batch future without touching `self` again, so the caller
    /// can drive it while the fetcher stays borrowable. Feed the outcome back
    /// through [`BackfillFetcher::record`] once it is known to be current.
    pub fn prepare(
        &self,
        instrument: &InstrumentId,
        interval: TimeInterval,
        gaps: &[Gap],
        token: &CancellationToken,
    ) -> impl Future<Output = BatchOutcome> + 'static {
        let generation = token.generation();
        let planned = self.plan(gaps);
        let skipped = gaps.len() - planned.len();
        let registration = token.attach();
        let transport = Rc::clone(&self.transport);
        let sleeper = Rc::clone(&self.sleeper);
        let settings = Rc::clone(&self.settings);
        let instrument = instrument.clone();

        async move {
            if planned.is_empty() {
                log_debug!(
                    LogComponent::Application("BackfillFetcher"),
                    "all {} gaps already served",
                    skipped
                );
                return BatchOutcome::skipped_all(generation, skipped);
            }

            let requested = planned.len();
            let requests = planned.iter().map(|gap| {
                fetch_gap(
                    Rc::clone(&transport),
                    Rc::clone(&sleeper),
                    Rc::clone(&settings),
                    instrument.clone(),
                    interval,
                    *gap,
                )
            });

            match Abortable::new(join_all(requests), registration).await {
                Ok(results) => {
                    let mut points = Vec::new();
                    let mut served: Option<TimeRange> = None;
                    for (gap, gap_points) in results {
                        if gap_points.is_empty() {
                            continue;
                        }
                        served = Some(match served {
                            Some(range) => range.hull(&gap.range()),
                            None => gap.range(),
                        });
                        points.extend(gap_points);
                    }
                    log_info!(
                        LogComponent::Application("BackfillFetcher"),
                        "batch {}: {} points from {} requests ({} skipped)",
                        generation,
                        points.len(),
                        requested,
                        skipped
                    );
                    BatchOutcome { generation, points, served, requested, skipped, cancelled: false }
                }
                Err(_aborted) => {
                    log_debug!(LogComponent::Application("BackfillFetcher"), "batch {} cancelled", generation);
                    BatchOutcome { generation, points: Vec::new(), served: None, requested, skipped, cancelled: true }
                }
            }
        }
    }

    /// Widens dedup state to what a merged batch actually served
    pub fn record(&mut self, outcome: &BatchOutcome) {
        if let Some(served) = outcome.served {
            self.last_served = Some(served);
        }
    }

    /// `prepare`, await and `record` in one step
    pub async fn fetch(
        &mut self,
        instrument: &InstrumentId,
        interval: TimeInterval,
        gaps: &[Gap],
        token: &CancellationToken,
    ) -> BatchOutcome {
        let outcome = self.prepare(instrument, interval, gaps, token).await;
        if !outcome.cancelled {
            self.record(&outcome);
        }
        outcome
    }
}

/// One gap request. Every failure degrades to an empty result.
async fn fetch_gap<T: OhlcvTransport, S: Sleeper>(
    transport: Rc<T>,
    sleeper: Rc<S>,
    settings: Rc<FetchSettings>,
    instrument: InstrumentId,
    interval: TimeInterval,
    gap: Gap,
) -> (Gap, Vec<Candle>) {
    let url = match OhlcvQuery::for_gap(&gap, &instrument, interval, &settings.exchange).url(&settings.base_url) {
        Ok(url) => url,
        Err(e) => {
            log_warn!(LogComponent::Application("BackfillFetcher"), "skipping gap: {}", e);
            return (gap, Vec::new());
        }
    };

    let response = match transport.get(&url).await {
        Ok(response) => response,
        Err(e) => {
            log_warn!(LogComponent::Application("BackfillFetcher"), "{}", e);
            return (gap, Vec::new());
        }
    };

    let points = match response.status {
        200..=299 => match normalize_response(&response.body, &settings.trading_hours, interval) {
            Ok(points) => points,
            Err(e) => {
                log_warn!(LogComponent::Application("BackfillFetcher"), "{} from {}", e, url);
                Vec::new()
            }
        },
        404 => {
            log_debug!(LogComponent::Application("BackfillFetcher"), "no data for {}", url);
            Vec::new()
        }
        429 => {
            log_warn!(
                LogComponent::Application("BackfillFetcher"),
                "rate limited, backing off {:?}",
                settings.rate_limit_backoff
            );
            sleeper.sleep(settings.rate_limit_backoff).await;
            Vec::new()
        }
        status => {
            log_warn!(LogComponent::Application("BackfillFetcher"), "{}", AppError::Http { status, url });
            Vec::new()
        }
    };
    (gap, points)
}
