use signal_hook::{
    consts::{SIGINT, SIGTERM},
    flag,
};
use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

/// Granularity of [`Shutdown::sleep`]; bounds how late a loop notices the signal.
const SLEEP_SLICE: Duration = Duration::from_millis(50);

/// Process-wide stop flag shared by every long-running loop.
///
/// Cloning is cheap; all clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    flag: Arc<AtomicBool>,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a flag that SIGINT and SIGTERM will raise.
    pub fn register_signals() -> std::io::Result<Self> {
        let shutdown = Self::new();
        flag::register(SIGTERM, Arc::clone(&shutdown.flag))?;
        flag::register(SIGINT, Arc::clone(&shutdown.flag))?;
        tracing::info!("Signal handlers registered (SIGTERM, SIGINT)");
        Ok(shutdown)
    }

    pub fn trigger(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_triggered(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    /// Sleep for `duration` unless shutdown is requested first.
    ///
    /// Returns `true` if the full duration elapsed, `false` if woken by shutdown.
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if self.is_triggered() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            thread::sleep((deadline - now).min(SLEEP_SLICE));
        }
    }

    /// Resolve once shutdown is requested. Used as axum's graceful-shutdown future.
    #[cfg(feature = "async")]
    pub async fn wait(&self) {
        while !self.is_triggered() {
            tokio::time::sleep(SLEEP_SLICE).await;
        }
    }
}
