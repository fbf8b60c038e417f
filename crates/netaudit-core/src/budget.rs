//! Socket budget (C4): a process-wide counting semaphore bounding the
//! number of TCP sockets the core holds open at any instant. Ping and ARP
//! subprocesses are not counted — only the core's own connections are.

use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

pub const HARD_MAX_SOCKETS: usize = 512;
pub const MIN_SOCKETS: usize = 64;

/// Platform default before clamping: lower on Windows, where socket churn
/// tends to saturate ephemeral port reuse sooner.
pub fn platform_default_max_sockets() -> usize {
    if cfg!(windows) {
        128
    } else {
        160
    }
}

pub fn clamp_max_sockets(requested: usize) -> usize {
    requested.clamp(MIN_SOCKETS, HARD_MAX_SOCKETS)
}

#[derive(Clone)]
pub struct SocketBudget {
    semaphore: Arc<Semaphore>,
    max_sockets: usize,
}

impl SocketBudget {
    pub fn new(max_sockets: usize) -> Self {
        let clamped = clamp_max_sockets(max_sockets);
        Self {
            semaphore: Arc::new(Semaphore::new(clamped)),
            max_sockets: clamped,
        }
    }

    pub fn max_sockets(&self) -> usize {
        self.max_sockets
    }

    /// Blocks until a permit is available. The returned guard releases its
    /// permit when dropped, covering every exit path (success, error,
    /// timeout) without explicit bookkeeping at the call site.
    pub async fn acquire(&self) -> SocketPermit {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .expect("socket budget semaphore never closes");
        SocketPermit { _permit: permit }
    }

    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }
}

pub struct SocketPermit {
    _permit: OwnedSemaphorePermit,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamps_below_minimum() {
        assert_eq!(clamp_max_sockets(1), MIN_SOCKETS);
    }

    #[test]
    fn clamps_above_hard_max() {
        assert_eq!(clamp_max_sockets(100_000), HARD_MAX_SOCKETS);
    }

    #[tokio::test]
    async fn permits_are_released_on_drop() {
        let budget = SocketBudget::new(64);
        assert_eq!(budget.available(), 64);
        {
            let _permit = budget.acquire().await;
            assert_eq!(budget.available(), 63);
        }
        assert_eq!(budget.available(), 64);
    }
}
