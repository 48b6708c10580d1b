//! Grouped gate between route readers and section calculations.
//!
//! Readers take the gate exclusively and only once no calculation is
//! registered. Calculations share it: the first one of a burst takes the
//! underlying mutex for the whole group, later ones join without waiting,
//! and the mutex is released when the last member leaves. That release fires
//! the settled callback exactly once per burst.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{watch, Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::debug;

type SettledCallback = Box<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct GroupState {
    active: usize,
    guard: Option<OwnedMutexGuard<()>>,
    acquired: bool,
}

struct Inner {
    gate: Arc<AsyncMutex<()>>,
    group: Mutex<GroupState>,
    held: watch::Sender<bool>,
    on_settled: Option<SettledCallback>,
}

impl Inner {
    fn group(&self) -> MutexGuard<'_, GroupState> {
        self.group.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn leave(&self) {
        let (released, acquired) = {
            let mut group = self.group();
            group.active = group.active.saturating_sub(1);
            if group.active > 0 {
                return;
            }
            let released = group.guard.take();
            if released.is_some() {
                self.held.send_replace(false);
            }
            (released, std::mem::take(&mut group.acquired))
        };
        // Waiters woken above still block on the gate until the guard drops,
        // so the notice always lands before a reader gets in.
        if acquired {
            debug!("Calculation burst settled");
            if let Some(callback) = &self.on_settled {
                callback();
            }
        }
        drop(released);
    }
}

#[derive(Clone)]
pub struct ChangeLock {
    inner: Arc<Inner>,
}

impl Default for ChangeLock {
    fn default() -> Self {
        Self::build(None)
    }
}

impl ChangeLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// `on_settled` runs on the task that drops the last calculation guard.
    pub fn with_settled(on_settled: impl Fn() + Send + Sync + 'static) -> Self {
        Self::build(Some(Box::new(on_settled)))
    }

    fn build(on_settled: Option<SettledCallback>) -> Self {
        let (held, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                gate: Arc::new(AsyncMutex::new(())),
                group: Mutex::new(GroupState::default()),
                held,
                on_settled,
            }),
        }
    }

    /// Exclusive access once every registered calculation has left.
    pub async fn enter(&self) -> ChangeGuard {
        let mut held = self.inner.held.subscribe();
        loop {
            let guard = Arc::clone(&self.inner.gate).lock_owned().await;
            {
                let mut group = self.inner.group();
                if group.active == 0 {
                    return ChangeGuard { _guard: guard };
                }
                // Registered calculations have not reached the gate yet.
                group.guard = Some(guard);
                self.inner.held.send_replace(true);
            }
            let _ = held.wait_for(|held| !*held).await;
        }
    }

    /// Register a calculation. Synchronous so the lock is never observed
    /// settled between spawning a task and its first poll.
    pub fn enter_calculation(&self) -> CalculationEntry {
        self.inner.group().active += 1;
        CalculationEntry {
            inner: Arc::clone(&self.inner),
        }
    }

    pub fn active_calculations(&self) -> usize {
        self.inner.group().active
    }

    pub fn is_settled(&self) -> bool {
        self.active_calculations() == 0
    }
}

/// Exclusive reader access.
pub struct ChangeGuard {
    _guard: OwnedMutexGuard<()>,
}

/// A registered calculation that has not joined the group yet.
///
/// Dropping it unregisters the calculation.
pub struct CalculationEntry {
    inner: Arc<Inner>,
}

impl CalculationEntry {
    /// Join the group, taking the gate if this is the first member.
    pub async fn acquire(self) -> CalculationGuard {
        let inner = Arc::clone(&self.inner);
        let mut held = inner.held.subscribe();
        loop {
            {
                let mut group = inner.group();
                held.borrow_and_update();
                if group.guard.is_some() {
                    group.acquired = true;
                    break;
                }
            }
            tokio::select! {
                guard = Arc::clone(&inner.gate).lock_owned() => {
                    let mut group = inner.group();
                    group.guard = Some(guard);
                    group.acquired = true;
                    inner.held.send_replace(true);
                    break;
                }
                _ = held.changed() => {}
            }
        }
        CalculationGuard { _entry: self }
    }
}

impl Drop for CalculationEntry {
    fn drop(&mut self) {
        self.inner.leave();
    }
}

/// Membership of the running calculation group.
pub struct CalculationGuard {
    _entry: CalculationEntry,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn counting_lock() -> (ChangeLock, Arc<AtomicUsize>) {
        let settled = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&settled);
        let lock = ChangeLock::with_settled(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        (lock, settled)
    }

    #[tokio::test]
    async fn burst_settles_once_after_last_release() {
        let (lock, settled) = counting_lock();
        let entries: Vec<_> = (0..5).map(|_| lock.enter_calculation()).collect();
        let guards = futures::future::join_all(entries.into_iter().map(|e| e.acquire())).await;
        assert_eq!(lock.active_calculations(), 5);

        let mut guards = guards.into_iter();
        for _ in 0..4 {
            drop(guards.next());
            assert_eq!(settled.load(Ordering::SeqCst), 0);
        }
        drop(guards.next());
        assert_eq!(settled.load(Ordering::SeqCst), 1);
        assert!(lock.is_settled());
    }

    #[tokio::test(start_paused = true)]
    async fn reader_waits_for_registered_calculations() {
        let (lock, settled) = counting_lock();
        let entry = lock.enter_calculation();

        let reader_lock = lock.clone();
        let reader = tokio::spawn(async move {
            let _guard = reader_lock.enter().await;
        });

        let calc = tokio::spawn(async move {
            let guard = entry.acquire().await;
            tokio::time::sleep(Duration::from_secs(1)).await;
            drop(guard);
        });

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(!reader.is_finished());

        calc.await.unwrap();
        reader.await.unwrap();
        assert_eq!(settled.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn calculations_wait_for_an_active_reader() {
        let (lock, _) = counting_lock();
        let reading = lock.enter().await;

        let calc_lock = lock.clone();
        let calc = tokio::spawn(async move {
            let _guard = calc_lock.enter_calculation().acquire().await;
        });
        tokio::task::yield_now().await;
        assert!(!calc.is_finished());

        drop(reading);
        calc.await.unwrap();
        assert!(lock.is_settled());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn reader_is_not_stranded_by_a_concurrent_last_release() {
        let (lock, settled) = counting_lock();
        for iteration in 0..5_000 {
            let entry = lock.enter_calculation();
            let dropper = std::thread::spawn(move || drop(entry));
            let entered = tokio::time::timeout(Duration::from_millis(500), lock.enter()).await;
            assert!(entered.is_ok(), "reader stuck at iteration {iteration}");
            dropper.join().unwrap();
        }
        assert!(lock.is_settled());
        assert_eq!(settled.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn overlapping_bursts_always_settle() {
        let (lock, settled) = counting_lock();
        for _ in 0..500 {
            let calcs: Vec<_> = (0..3)
                .map(|_| {
                    let entry = lock.enter_calculation();
                    tokio::spawn(async move {
                        let _guard = entry.acquire().await;
                        tokio::task::yield_now().await;
                    })
                })
                .collect();
            let reader = tokio::time::timeout(Duration::from_millis(500), lock.enter()).await;
            assert!(reader.is_ok());
            drop(reader);
            for calc in calcs {
                calc.await.unwrap();
            }
        }
        assert!(lock.is_settled());
        assert!(settled.load(Ordering::SeqCst) >= 500);
    }

    #[tokio::test]
    async fn dropped_entry_without_work_does_not_notify() {
        let (lock, settled) = counting_lock();
        drop(lock.enter_calculation());
        assert!(lock.is_settled());
        assert_eq!(settled.load(Ordering::SeqCst), 0);
        let _reader = lock.enter().await;
    }
}
