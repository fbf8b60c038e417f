//! Adaptive governor (C7): resizes the scan shape `(B, H, P, T)` between
//! batches based on observed latency and timeout rate. Pure state machine;
//! mutated only by the driver, only between batches.

use std::time::Duration;

pub const B_MIN: u32 = 6;
pub const B_MAX: u32 = 16;
pub const H_MIN: u32 = 4;
pub const H_MAX: u32 = 12;
pub const P_MIN: u32 = 2;
pub const P_MAX: u32 = 6;
pub const T_MIN: f64 = 1.5;
pub const T_MAX: f64 = 5.0;

// Configured but not referenced by the five-step ladder below — kept as a
// named threshold alongside the other two.
#[allow(dead_code)]
const TIMEOUT_HIGH: f64 = 0.30;
const TIMEOUT_MODERATE: f64 = 0.10;
const TIMEOUT_LOW: f64 = 0.05;
const COOLDOWN_BATCHES: u32 = 2;
const GOOD_TO_GROW: u32 = 3;
const SLOW_TO_CUT_HOSTS: u32 = 2;
const SLOW_TO_CUT_PORTS: u32 = 3;

/// The 4-tuple `(B, H, P, T)` = batch size, host concurrency, port
/// concurrency, socket timeout.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Shape {
    pub batch_size: u32,
    pub hosts: u32,
    pub ports: u32,
    pub timeout: f64,
}

impl Shape {
    pub fn socket_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.timeout)
    }
}

#[derive(Debug, Clone)]
pub struct GovernorConfig {
    pub max_sockets: usize,
    pub slow_s: f64,
    pub very_slow_s: f64,
    pub fast_s: f64,
}

impl GovernorConfig {
    /// Derives the designer-set thresholds from the starting timeout `t`
    /// (`slow = max(40s, 8T)`, etc).
    pub fn from_max_sockets_and_timeout(max_sockets: usize, t: f64) -> Self {
        Self {
            max_sockets,
            slow_s: 40.0_f64.max(8.0 * t),
            very_slow_s: 60.0_f64.max(12.0 * t),
            fast_s: 12.0_f64.max(3.0 * t),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Governor {
    config: GovernorConfig,
    shape: Shape,
    cooldown: u32,
    consecutive_good: u32,
    consecutive_slow: u32,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BatchOutcome {
    pub duration: Duration,
    pub timeouts: usize,
    pub completed: usize,
}

impl Governor {
    pub fn new(config: GovernorConfig, initial: Shape) -> Self {
        let shape = clamp_and_enforce(initial, config.max_sockets);
        Self {
            config,
            shape,
            cooldown: 0,
            consecutive_good: 0,
            consecutive_slow: 0,
        }
    }

    pub fn shape(&self) -> Shape {
        self.shape
    }

    /// Applies the reduction/growth ladder for one completed batch and
    /// returns the shape to use for the next one.
    pub fn on_batch_complete(&mut self, outcome: BatchOutcome) -> Shape {
        let duration_s = outcome.duration.as_secs_f64();
        let ratio = outcome.timeouts as f64 / outcome.completed.max(1) as f64;
        let slow = duration_s >= self.config.slow_s;
        let very_slow = duration_s >= self.config.very_slow_s;

        if self.cooldown > 0 {
            self.cooldown -= 1;
            self.update_good_counter(duration_s, ratio);
            return self.shape;
        }

        if slow {
            self.consecutive_slow += 1;
        } else {
            self.consecutive_slow = 0;
        }

        let mut changed = false;

        // Reduction ladder: at most one change per batch, first rule that
        // actually moves a value wins. A rule whose target is already at
        // its floor is a no-op and must fall through, or sustained
        // very-slow conditions would pin the ladder on batch size forever
        // and H/P would never reduce.
        if (very_slow || (slow && ratio >= TIMEOUT_MODERATE)) && self.shape.batch_size > B_MIN {
            self.shape.batch_size =
                (self.shape.batch_size as f64 * 0.85).floor().max(B_MIN as f64) as u32;
            changed = true;
        }

        if !changed && self.consecutive_slow >= SLOW_TO_CUT_HOSTS && self.shape.hosts > H_MIN {
            self.shape.hosts = ((self.shape.hosts as f64 * 0.85).floor() as u32).max(H_MIN);
            changed = true;
        }

        if !changed && self.consecutive_slow >= SLOW_TO_CUT_PORTS && self.shape.ports > P_MIN {
            self.shape.ports = self.shape.ports.saturating_sub(1).max(P_MIN);
            changed = true;
        }

        if !changed && ratio >= TIMEOUT_MODERATE && self.shape.timeout < T_MAX {
            self.shape.timeout = (self.shape.timeout + 0.5).min(T_MAX);
            changed = true;
        }

        if !changed {
            // Growth ladder only applies when nothing was reduced this batch.
            self.update_good_counter(duration_s, ratio);
            if duration_s <= self.config.fast_s
                && ratio <= TIMEOUT_LOW
                && self.consecutive_good >= GOOD_TO_GROW
            {
                self.grow_one_step();
                changed = true;
                self.consecutive_good = 0;
            }
        } else {
            self.consecutive_good = 0;
        }

        if changed {
            self.shape = clamp_and_enforce(self.shape, self.config.max_sockets);
            self.cooldown = COOLDOWN_BATCHES;
        }

        self.shape
    }

    fn update_good_counter(&mut self, duration_s: f64, ratio: f64) {
        if duration_s <= self.config.fast_s && ratio <= TIMEOUT_LOW {
            self.consecutive_good += 1;
        } else {
            self.consecutive_good = 0;
        }
    }

    fn grow_one_step(&mut self) {
        if self.shape.batch_size < B_MAX {
            self.shape.batch_size += 1;
        } else if self.shape.hosts < H_MAX {
            self.shape.hosts += 1;
        } else if self.shape.ports < P_MAX {
            self.shape.ports += 1;
        }
    }
}

/// Clamps all four values to their configured ranges, then re-enforces
/// `H*P <= floor(0.85*MAX_SOCKETS)` by decrementing ports first, then
/// hosts, until satisfied.
fn clamp_and_enforce(mut shape: Shape, max_sockets: usize) -> Shape {
    shape.batch_size = shape.batch_size.clamp(B_MIN, B_MAX);
    shape.hosts = shape.hosts.clamp(H_MIN, H_MAX);
    shape.ports = shape.ports.clamp(P_MIN, P_MAX);
    shape.timeout = shape.timeout.clamp(T_MIN, T_MAX);

    let ceiling = (max_sockets as f64 * 0.85).floor() as u32;
    while shape.hosts * shape.ports > ceiling && shape.ports > P_MIN {
        shape.ports -= 1;
    }
    while shape.hosts * shape.ports > ceiling && shape.hosts > H_MIN {
        shape.hosts -= 1;
    }
    shape
}
