// ABOUTME: Flow control for submit traffic: token-bucket rate limiting, in-flight windows, bounded worker pools
// ABOUTME: Used per client factory and per server session so one busy peer cannot starve the rest

use crate::error::{GatewayError, GatewayResult};
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tokio_util::task::TaskTracker;

/// Counters for monitoring a [`RateLimiter`]
#[derive(Debug, Clone, Default)]
pub struct RateLimiterStatistics {
    pub allowed: u64,
    pub denied: u64,
}

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
    statistics: RateLimiterStatistics,
}

/// Non-blocking token bucket.
///
/// Refills at `throughput` tokens per second and holds at most `burst`
/// tokens, starting full. Callers that are denied back off and retry.
#[derive(Debug)]
pub struct RateLimiter {
    rate: f64,
    burst: f64,
    bucket: Mutex<Bucket>,
}

impl RateLimiter {
    pub fn new(throughput: u32, burst: u32) -> Self {
        let burst = f64::from(burst.max(1));
        Self {
            rate: f64::from(throughput.max(1)),
            burst,
            bucket: Mutex::new(Bucket {
                tokens: burst,
                last_refill: Instant::now(),
                statistics: RateLimiterStatistics::default(),
            }),
        }
    }

    pub fn allow(&self) -> bool {
        self.allow_at(Instant::now())
    }

    pub fn allow_at(&self, now: Instant) -> bool {
        let mut bucket = self.bucket.lock();
        let elapsed = now.saturating_duration_since(bucket.last_refill);
        bucket.tokens = (bucket.tokens + elapsed.as_secs_f64() * self.rate).min(self.burst);
        bucket.last_refill = bucket.last_refill.max(now);

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            bucket.statistics.allowed += 1;
            true
        } else {
            bucket.statistics.denied += 1;
            false
        }
    }

    /// Time between two tokens
    pub fn token_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.rate)
    }

    pub fn statistics(&self) -> RateLimiterStatistics {
        self.bucket.lock().statistics.clone()
    }
}

/// A held window slot; dropping it releases the slot
#[derive(Debug)]
pub struct WindowPermit {
    _permit: OwnedSemaphorePermit,
}

/// Bounded count of in-flight exchanges.
///
/// Once closed, waiting and new acquisitions fail, while permits still held
/// can be dropped safely.
#[derive(Debug, Clone)]
pub struct Window {
    slots: Arc<Semaphore>,
    capacity: usize,
}

impl Window {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            slots: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// Wait for a free slot. `None` once the window is closed.
    pub async fn acquire(&self) -> Option<WindowPermit> {
        self.slots
            .clone()
            .acquire_owned()
            .await
            .ok()
            .map(|permit| WindowPermit { _permit: permit })
    }

    pub fn try_acquire(&self) -> GatewayResult<WindowPermit> {
        match self.slots.clone().try_acquire_owned() {
            Ok(permit) => Ok(WindowPermit { _permit: permit }),
            Err(TryAcquireError::NoPermits) => Err(GatewayError::FlowControl),
            Err(TryAcquireError::Closed) => Err(GatewayError::ConnectionClosed),
        }
    }

    pub fn close(&self) {
        self.slots.close();
    }

    pub fn is_closed(&self) -> bool {
        self.slots.is_closed()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn in_flight(&self) -> usize {
        self.capacity.saturating_sub(self.slots.available_permits())
    }
}

/// Bounded set of concurrently running handler tasks for one session
#[derive(Debug, Clone)]
pub struct WorkerPool {
    slots: Arc<Semaphore>,
    tracker: TaskTracker,
}

impl WorkerPool {
    pub fn new(size: usize) -> Self {
        Self {
            slots: Arc::new(Semaphore::new(size.max(1))),
            tracker: TaskTracker::new(),
        }
    }

    /// Run `task` in the background. Fails without waiting when every worker
    /// is busy or the pool is closed.
    pub fn submit<F>(&self, task: F) -> GatewayResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let permit = match self.slots.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(TryAcquireError::NoPermits) => return Err(GatewayError::FlowControl),
            Err(TryAcquireError::Closed) => {
                return Err(GatewayError::InvalidState("worker pool closed".into()));
            }
        };

        self.tracker.spawn(async move {
            task.await;
            drop(permit);
        });
        Ok(())
    }

    /// Refuse new work; running tasks finish on their own
    pub fn close(&self) {
        self.slots.close();
        self.tracker.close();
    }

    /// Wait for running tasks after [`WorkerPool::close`]
    pub async fn wait(&self) {
        self.tracker.wait().await;
    }

    pub fn active(&self) -> usize {
        self.tracker.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn bucket_starts_full_and_drains() {
        let limiter = RateLimiter::new(10, 3);
        let now = Instant::now();
        assert!(limiter.allow_at(now));
        assert!(limiter.allow_at(now));
        assert!(limiter.allow_at(now));
        assert!(!limiter.allow_at(now));

        let stats = limiter.statistics();
        assert_eq!(stats.allowed, 3);
        assert_eq!(stats.denied, 1);
    }

    #[test]
    fn bucket_refills_at_rate() {
        let limiter = RateLimiter::new(10, 1);
        let now = Instant::now();
        assert!(limiter.allow_at(now));
        assert!(!limiter.allow_at(now + Duration::from_millis(50)));
        assert!(limiter.allow_at(now + Duration::from_millis(160)));
        assert_eq!(limiter.token_interval(), Duration::from_millis(100));
    }

    #[test]
    fn bucket_never_exceeds_burst() {
        let limiter = RateLimiter::new(1000, 2);
        let later = Instant::now() + Duration::from_secs(60);
        assert!(limiter.allow_at(later));
        assert!(limiter.allow_at(later));
        assert!(!limiter.allow_at(later));
    }

    #[tokio::test]
    async fn window_caps_in_flight() {
        let window = Window::new(2);
        let a = window.try_acquire().unwrap();
        let _b = window.acquire().await.unwrap();
        assert_eq!(window.in_flight(), 2);
        assert!(matches!(window.try_acquire(), Err(GatewayError::FlowControl)));

        drop(a);
        assert_eq!(window.in_flight(), 1);
        assert!(window.try_acquire().is_ok());
    }

    #[tokio::test]
    async fn releasing_after_close_is_harmless() {
        let window = Window::new(1);
        let permit = window.try_acquire().unwrap();
        window.close();
        drop(permit);

        assert!(window.is_closed());
        assert!(window.acquire().await.is_none());
        assert!(matches!(window.try_acquire(), Err(GatewayError::ConnectionClosed)));
    }

    #[tokio::test]
    async fn closing_wakes_waiters() {
        let window = Window::new(1);
        let _held = window.try_acquire().unwrap();
        let waiter = {
            let window = window.clone();
            tokio::spawn(async move { window.acquire().await.is_none() })
        };
        tokio::task::yield_now().await;
        window.close();
        assert!(waiter.await.unwrap());
    }

    #[tokio::test]
    async fn worker_pool_rejects_when_full_or_closed() {
        let pool = WorkerPool::new(1);
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        pool.submit(async move {
            let _ = rx.await;
        })
        .unwrap();

        assert!(matches!(pool.submit(async {}), Err(GatewayError::FlowControl)));

        tx.send(()).unwrap();
        pool.close();
        pool.wait().await;
        assert!(matches!(pool.submit(async {}), Err(GatewayError::InvalidState(_))));
    }

    #[tokio::test]
    async fn worker_pool_runs_tasks() {
        let pool = WorkerPool::new(4);
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..4 {
            let counter = counter.clone();
            pool.submit(async move {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        }
        pool.close();
        pool.wait().await;
        assert_eq!(counter.load(Ordering::SeqCst), 4);
        assert_eq!(pool.active(), 0);
    }
}
