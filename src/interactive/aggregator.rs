use chrono::{DateTime, Local};
use statum::{machine, state};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::TickSettings;
use crate::controls::{ControlId, ControlRegistry, ParticipantId};
use crate::interactive::count_state::{ButtonCounts, CountState};
use crate::interactive::event_ingress::{EventIngress, InputEvent};

// Events taken from the ingress for one pass
#[derive(Debug, Clone, Default)]
pub struct EventBatch {
    pub events: Vec<InputEvent>,
    pub dropped: u64,
}

/// Outcome of one `do_work` pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub tick: u64,
    /// Events counted into the new window
    pub events_applied: u64,
    /// Events for controls the registry does not know
    pub events_skipped: u64,
    /// Events lost at the ingress bound since the previous pass
    pub events_dropped: u64,
}

/// Immutable view of one tick window.
///
/// Holds the events received strictly between the two most recent `do_work`
/// calls. Readers keep an `Arc` to it, so a later pass never changes what they see.
#[derive(Debug, Clone, Default)]
pub struct TickSnapshot {
    counts: CountState,
    report: TickReport,
    completed_at: Option<DateTime<Local>>,
}

impl TickSnapshot {
    pub fn tick(&self) -> u64 {
        self.report.tick
    }

    pub fn report(&self) -> TickReport {
        self.report
    }

    pub fn counts(&self) -> &CountState {
        &self.counts
    }

    pub fn completed_at(&self) -> Option<DateTime<Local>> {
        self.completed_at
    }

    pub fn button_counts(
        &self,
        control_id: &ControlId,
        participant_id: Option<ParticipantId>,
    ) -> ButtonCounts {
        self.counts.counts(control_id, participant_id)
    }
}

// Phases of one tick pass
#[state]
#[derive(Debug, Clone)]
pub enum TickState {
    Draining,
    Applying(EventBatch),
    Publishing,
}

#[machine]
#[derive(Debug)]
pub struct TickPass<S: TickState> {
    // Window being built
    counts: CountState,

    // Running report for this pass
    report: TickReport,

    started_at: DateTime<Local>,
}

impl TickPass<Draining> {
    pub fn start(tick: u64) -> Self {
        Self::new(
            CountState::default(),
            TickReport {
                tick,
                ..TickReport::default()
            },
            Local::now(),
        )
    }

    // Take everything buffered so far; later events land in the next window
    pub fn drain(self, ingress: &EventIngress) -> TickPass<Applying> {
        let (events, dropped) = ingress.drain();
        if dropped > 0 {
            warn!(
                "Tick {}: {} events dropped at ingress bound ({} events)",
                self.report.tick,
                dropped,
                ingress.settings().capacity
            );
        }
        if events.is_empty() {
            debug!("Tick {}: no events buffered", self.report.tick);
        } else {
            debug!("Tick {}: drained {} events", self.report.tick, events.len());
        }

        self.transition_with(EventBatch { events, dropped })
    }
}

impl TickPass<Applying> {
    // Count the batch into a fresh window; the previous window is discarded here
    pub fn apply(mut self, registry: &ControlRegistry) -> TickPass<Publishing> {
        let mut counts = CountState::default();
        let mut applied = 0;
        let mut skipped = 0;
        let mut dropped = 0;

        if let Some(batch) = self.get_state_data() {
            dropped = batch.dropped;
            for event in &batch.events {
                if !registry.contains(&event.control_id) {
                    debug!(
                        "Skipping {:?} from participant {} for unknown control {}",
                        event.kind, event.participant_id, event.control_id
                    );
                    skipped += 1;
                    continue;
                }
                counts.apply(event);
                applied += 1;
            }
        } else {
            warn!("No event batch found in applying state, publishing empty window");
        }

        self.counts = counts;
        self.report.events_applied = applied;
        self.report.events_skipped = skipped;
        self.report.events_dropped = dropped;

        if skipped > 0 {
            warn!(
                "Tick {}: skipped {} events for unknown controls",
                self.report.tick, skipped
            );
        }

        self.transition()
    }
}

impl TickPass<Publishing> {
    pub fn publish(self, sender: &watch::Sender<Arc<TickSnapshot>>) -> Arc<TickSnapshot> {
        let snapshot = Arc::new(TickSnapshot {
            counts: self.counts,
            report: self.report,
            completed_at: Some(Local::now()),
        });

        // send_replace succeeds even when no receiver is subscribed
        sender.send_replace(snapshot.clone());

        let elapsed = Local::now() - self.started_at;
        debug!(
            "Tick {} published: {} applied, {} skipped, {} dropped in {}µs",
            snapshot.report.tick,
            snapshot.report.events_applied,
            snapshot.report.events_skipped,
            snapshot.report.events_dropped,
            elapsed.num_microseconds().unwrap_or_default()
        );

        snapshot
    }
}

#[derive(Debug)]
struct PassLedger {
    next_tick: u64,
    ticks_since_stats: u64,
    events_since_stats: u64,
    last_stats_at: DateTime<Local>,
}

/// Single writer of the published count windows
#[derive(Debug)]
pub struct Aggregator {
    ingress: EventIngress,
    settings: TickSettings,
    snapshot_sender: watch::Sender<Arc<TickSnapshot>>,
    // Held for a whole pass so overlapping do_work calls run one after another
    ledger: Mutex<PassLedger>,
}

impl Aggregator {
    pub fn new(ingress: EventIngress, settings: TickSettings) -> Self {
        info!("Creating aggregator with settings: {:?}", settings);
        let (snapshot_sender, _) = watch::channel(Arc::new(TickSnapshot::default()));

        Self {
            ingress,
            settings,
            snapshot_sender,
            ledger: Mutex::new(PassLedger {
                next_tick: 1,
                ticks_since_stats: 0,
                events_since_stats: 0,
                last_stats_at: Local::now(),
            }),
        }
    }

    /// Runs one tick pass: drain, count into a fresh window, publish
    pub fn do_work(&self, registry: &ControlRegistry) -> Arc<TickSnapshot> {
        let mut ledger = self.lock_ledger();
        let tick = ledger.next_tick;
        ledger.next_tick += 1;

        let snapshot = TickPass::<Draining>::start(tick)
            .drain(&self.ingress)
            .apply(registry)
            .publish(&self.snapshot_sender);

        ledger.ticks_since_stats += 1;
        ledger.events_since_stats += snapshot.report().events_applied;
        self.log_stats(&mut ledger);

        snapshot
    }

    /// Latest published window
    pub fn snapshot(&self) -> Arc<TickSnapshot> {
        self.snapshot_sender.borrow().clone()
    }

    /// Receiver notified after every pass
    pub fn subscribe(&self) -> watch::Receiver<Arc<TickSnapshot>> {
        self.snapshot_sender.subscribe()
    }

    pub fn ingress(&self) -> &EventIngress {
        &self.ingress
    }

    pub fn settings(&self) -> &TickSettings {
        &self.settings
    }

    fn log_stats(&self, ledger: &mut PassLedger) {
        let now = Local::now();
        let elapsed = now - ledger.last_stats_at;
        if elapsed < chrono::Duration::seconds(self.settings.stats_interval_secs) {
            return;
        }

        let elapsed_seconds = elapsed.num_seconds().max(1) as f64;
        info!(
            "Aggregator stats: {} ticks, {} events in {:.0} seconds",
            ledger.ticks_since_stats, ledger.events_since_stats, elapsed_seconds
        );
        info!(
            "Average: {:.2} events/tick, {:.2} ticks/sec, {} dropped total",
            ledger.events_since_stats as f64 / ledger.ticks_since_stats.max(1) as f64,
            ledger.ticks_since_stats as f64 / elapsed_seconds,
            self.ingress.dropped_total()
        );

        ledger.ticks_since_stats = 0;
        ledger.events_since_stats = 0;
        ledger.last_stats_at = now;
    }

    fn lock_ledger(&self) -> MutexGuard<'_, PassLedger> {
        self.ledger
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
#[path = "tests/aggregator_tests.rs"]
mod tests;
