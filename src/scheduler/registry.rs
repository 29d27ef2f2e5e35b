use chrono::{DateTime, Duration, Local, NaiveDateTime, TimeZone};
use futures::future::BoxFuture;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;

use crate::domain::time_key::TimeKey;

/// Invoked every time a timer fires. The returned future runs on its own task, so stopping the
/// timer later does not cancel a delivery that already started.
pub type FireCallback = Arc<dyn Fn(TimeKey) -> BoxFuture<'static, ()> + Send + Sync>;

/// One daily timer per time-of-day key.
#[derive(Default)]
pub struct RecurrenceRegistry {
    timers: HashMap<TimeKey, DailyTimer>,
    generation: u64,
}

impl RecurrenceRegistry {
    /// Replaces every registered timer with one timer per key in `time_keys`. All the old timers
    /// are stopped before the first new one starts.
    #[tracing::instrument(name = "Rebuild delivery timers", skip(self, time_keys, on_fire))]
    pub fn rebuild(&mut self, time_keys: &HashSet<TimeKey>, on_fire: FireCallback) {
        self.stop_all();

        for time_key in time_keys {
            let timer = DailyTimer::start(time_key.clone(), on_fire.clone());
            self.timers.insert(time_key.clone(), timer);
        }
        self.generation += 1;

        tracing::info!(
            generation = self.generation,
            "Rescheduled {} comic delivery jobs",
            self.timers.len()
        );
    }

    pub fn stop_all(&mut self) {
        for (_, timer) in self.timers.drain() {
            timer.stop();
        }
    }

    pub fn keys(&self) -> HashSet<TimeKey> {
        self.timers.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.timers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }

    /// Number of rebuilds performed so far.
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl Drop for RecurrenceRegistry {
    fn drop(&mut self) {
        self.stop_all();
    }
}

struct DailyTimer {
    armed: Arc<Mutex<bool>>,
    handle: JoinHandle<()>,
}

impl DailyTimer {
    fn start(time_key: TimeKey, on_fire: FireCallback) -> DailyTimer {
        let (hour, minute) = time_key.hour_minute();
        let armed = Arc::new(Mutex::new(true));
        let task_armed = armed.clone();

        tracing::info!(
            "Scheduled comic delivery at {} ({:02}:{:02} every day)",
            time_key,
            hour,
            minute
        );

        let handle = tokio::spawn(async move {
            let mut next_fire = next_fire_after(&Local::now(), hour, minute);

            loop {
                let wait = (next_fire - Local::now()).to_std().unwrap_or_default();
                tokio::time::sleep(wait).await;

                {
                    // Checked under the lock so a concurrent `stop` either wins and no run
                    // starts, or waits until this run has been spawned.
                    let armed = task_armed.lock().unwrap_or_else(|err| err.into_inner());
                    if !*armed {
                        return;
                    }
                    tracing::info!("Sending daily comics at {}", time_key);
                    tokio::spawn(on_fire(time_key.clone()));
                }

                // Never fire twice for the same slot, and skip slots missed while suspended.
                let from = std::cmp::max(next_fire, Local::now());
                next_fire = next_fire_after(&from, hour, minute);
            }
        });

        DailyTimer { armed, handle }
    }

    /// Once this returns the timer will not fire again.
    fn stop(self) {
        *self.armed.lock().unwrap_or_else(|err| err.into_inner()) = false;
        self.handle.abort();
    }
}

/// Longest wall-clock gap searched when a DST change skips the requested time.
const MAX_GAP_MINUTES: i64 = 24 * 60;

/// First instant strictly after `after` whose wall-clock time is `hour:minute`. On days where a
/// DST change skips that time, the first valid instant after the gap is used instead.
pub fn next_fire_after<Tz: TimeZone>(after: &DateTime<Tz>, hour: u32, minute: u32) -> DateTime<Tz> {
    let timezone = after.timezone();
    let mut date = after.date_naive();

    loop {
        let candidate = date
            .and_hms_opt(hour, minute, 0)
            .and_then(|naive| first_valid_local(&timezone, naive))
            .filter(|candidate| candidate > after);

        if let Some(candidate) = candidate {
            return candidate;
        }

        date = date + Duration::days(1);
    }
}

fn first_valid_local<Tz: TimeZone>(timezone: &Tz, naive: NaiveDateTime) -> Option<DateTime<Tz>> {
    (0..=MAX_GAP_MINUTES).find_map(|offset| {
        timezone
            .from_local_datetime(&(naive + Duration::minutes(offset)))
            .earliest()
    })
}
