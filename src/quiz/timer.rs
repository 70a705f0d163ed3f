// src/quiz/timer.rs

use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::time::{self, Instant, MissedTickBehavior};

/// Seconds left at which each tick also fires an urgency alert.
pub const URGENT_WINDOW: u32 = 5;

/// One countdown step. Never goes below zero.
pub fn tick(remaining: u32) -> u32 {
    remaining.saturating_sub(1)
}

/// True for 5, 4, 3, 2 and 1 seconds left; never for 0.
pub fn is_urgent(remaining: u32) -> bool {
    remaining > 0 && remaining <= URGENT_WINDOW
}

/// Fraction of the question's time still left, in `[0, 1]`.
pub fn progress_fraction(remaining: u32, duration: u32) -> f64 {
    if duration == 0 {
        return 0.0;
    }
    (remaining.min(duration) as f64) / (duration as f64)
}

/// Cubic ease-out, used to animate the countdown ring between ticks.
pub fn ease_out_cubic(t: f64) -> f64 {
    let t = t.clamp(0.0, 1.0);
    1.0 - (1.0 - t).powi(3)
}

/// What the owner of the countdown decided after a tick.
pub(crate) enum Step {
    Continue,
    /// The question ran out of time; wait `delay` and then call the expiry hook.
    Expired { delay: Duration },
    /// The question this countdown was armed for is gone.
    Stale,
}

/// Drives a one-second countdown for one question.
///
/// Holds only a weak reference to its owner so a dropped quiz stops the task on
/// its next tick. `on_tick` decides what each tick means; `on_expired` runs
/// after the expiry delay if the owner is still alive.
pub(crate) async fn run_countdown<T, F, G>(owner: Weak<T>, period: Duration, on_tick: F, on_expired: G)
where
    F: Fn(&Arc<T>) -> Step,
    G: FnOnce(&Arc<T>),
{
    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        let Some(strong) = owner.upgrade() else {
            return;
        };

        match on_tick(&strong) {
            Step::Continue => {}
            Step::Stale => return,
            Step::Expired { delay } => {
                drop(strong);
                time::sleep(delay).await;
                if let Some(strong) = owner.upgrade() {
                    on_expired(&strong);
                }
                return;
            }
        }
    }
}
