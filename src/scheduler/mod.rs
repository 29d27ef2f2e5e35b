//! Daily comic delivery scheduling.
//!
//! - [`preferences`]: which delivery times are in use, and whether that changed.
//! - [`registry`]: one daily timer per delivery time.
//! - [`delivery`]: the batched delivery run started by a timer.
//!
//! [`Scheduler`] ties them together and is the only thing the HTTP layer talks to.

pub mod delivery;
pub mod preferences;
pub mod registry;

use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::domain::time_key::TimeKey;
use crate::store::SubscriberStore;
use delivery::DeliveryRunner;
use registry::{FireCallback, RecurrenceRegistry};

#[derive(Default)]
struct SchedulerState {
    registry: RecurrenceRegistry,
    known_preferences: HashSet<TimeKey>,
}

/// Cheap to clone; every clone drives the same timers.
#[derive(Clone)]
pub struct Scheduler {
    state: Arc<Mutex<SchedulerState>>,
    store: Arc<dyn SubscriberStore>,
    on_fire: FireCallback,
}

impl Scheduler {
    pub fn new(store: Arc<dyn SubscriberStore>, runner: Arc<DeliveryRunner>) -> Scheduler {
        Scheduler::with_callback(store, delivery_callback(runner))
    }

    pub fn with_callback(store: Arc<dyn SubscriberStore>, on_fire: FireCallback) -> Scheduler {
        Scheduler {
            state: Arc::new(Mutex::new(SchedulerState::default())),
            store,
            on_fire,
        }
    }

    /// Registers timers for whatever delivery times exist right now, without comparing against
    /// a previous snapshot. Call once at startup, after the database is reachable.
    #[tracing::instrument(name = "Start comic delivery scheduler", skip(self))]
    pub async fn start(&self) {
        let mut state = self.state.lock().await;

        match preferences::active_preferences(self.store.as_ref()).await {
            Ok(current) => self.rebuild(&mut state, current),
            Err(err) => {
                tracing::error!("Failed to schedule comic deliveries: {:?}", err);
            }
        }
    }

    /// Safe to call after any subscriber change. Timers are only rebuilt when the set of
    /// delivery times is different from the one they were built from.
    #[tracing::instrument(name = "Re-evaluate comic delivery schedule", skip(self))]
    pub async fn notify_preferences_may_have_changed(&self) {
        let mut state = self.state.lock().await;

        let current = match preferences::active_preferences(self.store.as_ref()).await {
            Ok(current) => current,
            Err(err) => {
                tracing::error!("Failed to schedule comic deliveries: {:?}", err);
                return;
            }
        };

        if !preferences::has_changed(&state.known_preferences, &current) {
            tracing::info!("No preference changes detected, skipping rescheduling");
            return;
        }

        self.rebuild(&mut state, current);
    }

    /// Stops every timer. Delivery runs already in progress finish on their own.
    pub async fn stop(&self) {
        let mut state = self.state.lock().await;

        state.registry.stop_all();
        state.known_preferences.clear();
    }

    pub async fn active_time_keys(&self) -> HashSet<TimeKey> {
        self.state.lock().await.registry.keys()
    }

    /// How many times the timers have been rebuilt.
    pub async fn generation(&self) -> u64 {
        self.state.lock().await.registry.generation()
    }

    fn rebuild(&self, state: &mut SchedulerState, current: HashSet<TimeKey>) {
        state.registry.rebuild(&current, self.on_fire.clone());
        state.known_preferences = current;
    }
}

fn delivery_callback(runner: Arc<DeliveryRunner>) -> FireCallback {
    Arc::new(move |time_key: TimeKey| {
        let runner = runner.clone();

        Box::pin(async move {
            match runner.run_for_time(&time_key).await {
                Ok(report) => tracing::info!(
                    time_key = %time_key,
                    delivered = report.delivered,
                    failed = report.failed,
                    "Comic delivery run finished"
                ),
                Err(err) => tracing::error!(
                    time_key = %time_key,
                    "Comic delivery run aborted: {:?}",
                    err
                ),
            }
        })
    })
}
