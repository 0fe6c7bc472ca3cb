//! Minute-aligned clock updates
//!
//! A single spawned task sleeps until the next wall-clock minute, runs the
//! callback and recomputes the delay from the current time. Nothing assumes a
//! fixed 60s period, so a slow tick does not push later ticks off the boundary.

use crate::clock::Clock;
use chrono::{DateTime, Local, Timelike};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

/// Time left until the next minute boundary, always in (0, 60s]
pub fn delay_until_next_minute<T: Timelike>(now: &T) -> Duration {
    // nanosecond() exceeds 1s during a leap second
    let elapsed_ms = u64::from(now.second()) * 1_000 + u64::from(now.nanosecond() / 1_000_000);
    Duration::from_millis(60_000u64.saturating_sub(elapsed_ms).max(1))
}

fn fire_time(now: DateTime<Local>, delay: Duration) -> DateTime<Local> {
    now + chrono::Duration::milliseconds(delay.as_millis() as i64)
}

/// Tagged with the arm generation so a cancelled task cannot overwrite a
/// newer schedule.
type NextFire = (u64, Option<DateTime<Local>>);

/// Update the published fire time unless a newer arm or disarm replaced it
fn publish(next_fire: &watch::Sender<NextFire>, generation: u64, at: Option<DateTime<Local>>) {
    next_fire.send_if_modified(|current| {
        if current.0 != generation {
            return false;
        }
        current.1 = at;
        true
    });
}

pub struct UpdateScheduler {
    task: Option<JoinHandle<()>>,
    generation: u64,
    next_fire: Arc<watch::Sender<NextFire>>,
}

impl Default for UpdateScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl UpdateScheduler {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel((0, None));
        Self {
            task: None,
            generation: 0,
            next_fire: Arc::new(tx),
        }
    }

    /// Cancel any pending timer and start a fresh one.
    ///
    /// `on_fire` runs at every minute boundary; returning `false` stops the loop.
    pub fn arm<F, Fut>(&mut self, clock: Arc<dyn Clock>, mut on_fire: F)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        self.disarm();
        self.generation += 1;
        let generation = self.generation;

        let now = clock.now();
        let mut delay = delay_until_next_minute(&now);
        self.next_fire
            .send_replace((generation, Some(fire_time(now, delay))));
        debug!(delay_ms = delay.as_millis() as u64, "Next clock update scheduled");

        let next_fire = Arc::clone(&self.next_fire);
        self.task = Some(tokio::spawn(async move {
            loop {
                tokio::time::sleep(delay).await;
                if !on_fire().await {
                    publish(&next_fire, generation, None);
                    debug!("Clock updates stopped by callback");
                    break;
                }
                let now = clock.now();
                delay = delay_until_next_minute(&now);
                publish(&next_fire, generation, Some(fire_time(now, delay)));
                debug!(delay_ms = delay.as_millis() as u64, "Next clock update scheduled");
            }
        }));
    }

    /// Cancel the pending timer, if any. Safe to call repeatedly.
    pub fn disarm(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            debug!("Clock updates disarmed");
        }
        self.generation += 1;
        self.next_fire.send_replace((self.generation, None));
    }

    pub fn is_armed(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    pub fn next_update_at(&self) -> Option<DateTime<Local>> {
        self.next_fire.borrow().1
    }
}

impl Drop for UpdateScheduler {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
