// SPDX-FileCopyrightText: 2026 Keyhold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Idle auto-lock timer.
//!
//! One task per session machine sleeps until the idle deadline, re-reads the
//! last activity and locks if nothing happened in between. With auto-lock
//! disabled (or nothing to lock) the task wakes on a 10 minute keep-alive
//! cadence and never locks.

use std::future::Future;
use std::sync::{Mutex, Weak};
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, trace};

/// Shortest idle timeout honoured; shorter settings are raised to this.
pub const MIN_IDLE_TIMEOUT: Duration = Duration::from_secs(30);

/// Wake-up cadence when there is nothing to lock.
pub const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(10 * 60);

pub fn effective_timeout(configured: Duration) -> Duration {
    configured.max(MIN_IDLE_TIMEOUT)
}

/// What the timer needs to know about the session on each wake-up.
#[derive(Debug, Clone, Copy)]
pub(crate) struct IdleSnapshot {
    pub auto_lock: bool,
    pub unlocked: bool,
    pub timeout: Duration,
    pub last_activity: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum IdleDecision {
    LockNow,
    KeepAlive(Instant),
    WaitUntil(Instant),
}

pub(crate) fn next_check(snapshot: &IdleSnapshot, now: Instant) -> IdleDecision {
    if !snapshot.auto_lock || !snapshot.unlocked {
        return IdleDecision::KeepAlive(now + KEEP_ALIVE_INTERVAL);
    }
    let deadline = snapshot.last_activity + effective_timeout(snapshot.timeout);
    if now >= deadline {
        IdleDecision::LockNow
    } else {
        IdleDecision::WaitUntil(deadline)
    }
}

/// The session as seen by the timer task.
#[async_trait]
pub(crate) trait IdleTarget: Send + Sync + 'static {
    async fn idle_snapshot(&self) -> IdleSnapshot;

    /// Lock unless activity was recorded after `observed_activity`.
    async fn lock_for_idle(&self, observed_activity: Instant);
}

/// Timer loop. Holds only a weak reference so the session can be dropped.
pub(crate) async fn run<T: IdleTarget>(target: Weak<T>) {
    loop {
        let Some(strong) = target.upgrade() else {
            return;
        };
        let snapshot = strong.idle_snapshot().await;

        match next_check(&snapshot, Instant::now()) {
            IdleDecision::LockNow => {
                debug!(timeout_secs = snapshot.timeout.as_secs(), "idle timeout reached");
                strong.lock_for_idle(snapshot.last_activity).await;
            }
            IdleDecision::WaitUntil(deadline) => {
                drop(strong);
                tokio::time::sleep_until(deadline).await;
            }
            IdleDecision::KeepAlive(deadline) => {
                drop(strong);
                tokio::time::sleep_until(deadline).await;
                trace!("idle keep-alive tick");
            }
        }
    }
}

/// Owner of the single timer task.
#[derive(Default)]
pub(crate) struct IdleTimer {
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl IdleTimer {
    /// Replace the running task (if any) with `task`.
    pub fn rearm<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let next = tokio::spawn(task);
        let previous = match self.handle.lock() {
            Ok(mut guard) => guard.replace(next),
            Err(poisoned) => poisoned.into_inner().replace(next),
        };
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    pub fn cancel(&self) {
        let previous = match self.handle.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(previous) = previous {
            previous.abort();
        }
    }
}

impl Drop for IdleTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn snapshot(auto_lock: bool, unlocked: bool, last_activity: Instant) -> IdleSnapshot {
        IdleSnapshot {
            auto_lock,
            unlocked,
            timeout: Duration::from_secs(60),
            last_activity,
        }
    }

    #[test]
    fn timeout_floor_is_thirty_seconds() {
        assert_eq!(effective_timeout(Duration::from_secs(5)), MIN_IDLE_TIMEOUT);
        assert_eq!(
            effective_timeout(Duration::from_secs(120)),
            Duration::from_secs(120)
        );
    }

    #[tokio::test]
    async fn decision_follows_deadline() {
        let start = Instant::now();
        let snap = snapshot(true, true, start);

        assert_eq!(
            next_check(&snap, start + Duration::from_secs(10)),
            IdleDecision::WaitUntil(start + Duration::from_secs(60))
        );
        assert_eq!(
            next_check(&snap, start + Duration::from_secs(60)),
            IdleDecision::LockNow
        );
    }

    #[tokio::test]
    async fn disabled_or_locked_only_keeps_alive() {
        let start = Instant::now();
        let late = start + Duration::from_secs(3600);
        assert!(matches!(
            next_check(&snapshot(false, true, start), late),
            IdleDecision::KeepAlive(_)
        ));
        assert!(matches!(
            next_check(&snapshot(true, false, start), late),
            IdleDecision::KeepAlive(_)
        ));
    }

    struct FakeSession {
        last_activity: std::sync::Mutex<Instant>,
        unlocked: std::sync::atomic::AtomicBool,
        locks: AtomicUsize,
    }

    #[async_trait]
    impl IdleTarget for FakeSession {
        async fn idle_snapshot(&self) -> IdleSnapshot {
            IdleSnapshot {
                auto_lock: true,
                unlocked: self.unlocked.load(Ordering::SeqCst),
                timeout: Duration::from_secs(30),
                last_activity: *self.last_activity.lock().unwrap(),
            }
        }

        async fn lock_for_idle(&self, _observed: Instant) {
            self.unlocked.store(false, Ordering::SeqCst);
            self.locks.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn task_locks_once_after_timeout() {
        let session = Arc::new(FakeSession {
            last_activity: std::sync::Mutex::new(Instant::now()),
            unlocked: std::sync::atomic::AtomicBool::new(true),
            locks: AtomicUsize::new(0),
        });
        let timer = IdleTimer::default();
        timer.rearm(run(Arc::downgrade(&session)));

        tokio::time::sleep(Duration::from_secs(29)).await;
        assert_eq!(session.locks.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(session.locks.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(3600)).await;
        assert_eq!(session.locks.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn activity_pushes_the_deadline_back() {
        let session = Arc::new(FakeSession {
            last_activity: std::sync::Mutex::new(Instant::now()),
            unlocked: std::sync::atomic::AtomicBool::new(true),
            locks: AtomicUsize::new(0),
        });
        let timer = IdleTimer::default();
        timer.rearm(run(Arc::downgrade(&session)));

        tokio::time::sleep(Duration::from_secs(20)).await;
        *session.last_activity.lock().unwrap() = Instant::now();

        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(session.locks.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(session.locks.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn task_exits_when_session_is_dropped() {
        let session = Arc::new(FakeSession {
            last_activity: std::sync::Mutex::new(Instant::now()),
            unlocked: std::sync::atomic::AtomicBool::new(true),
            locks: AtomicUsize::new(0),
        });
        let handle = tokio::spawn(run(Arc::downgrade(&session)));
        drop(session);

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert!(handle.is_finished());
    }
}
