// src/display/queue.rs
//! Bottom-half queue drained by the display thread.
//!
//! A FIFO of deferred callbacks guarded by one mutex and a condition variable.
//! Callbacks execute on the draining thread *while the queue lock is held*, so they
//! are serialized with each other and with every submission. A callback therefore
//! must not submit to the same queue.
//!
//! Two kinds of work are accepted:
//! - [`BottomHalf`]: reusable, owned by the submitter, re-armed after each run.
//!   Re-submitting one that is still pending is refused.
//! - one-shot tasks, consumed by the queue and reported through a [`Completion`].

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, TryLockError};
use std::time::{Duration, Instant};

use log::*;

/// Lifecycle of a queued unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    /// Never submitted.
    Idle,
    /// Queued, not yet run.
    Pending,
    /// Ran to completion.
    Done,
    /// Dropped at teardown without running.
    Cancelled,
}

/// Completion token shared between the queue and a submitter.
#[derive(Debug, Clone)]
pub struct Completion {
    inner: Arc<(Mutex<TaskStatus>, Condvar)>,
}

impl Completion {
    fn new(status: TaskStatus) -> Self {
        Self {
            inner: Arc::new((Mutex::new(status), Condvar::new())),
        }
    }

    fn set(&self, status: TaskStatus) {
        let (lock, cond) = &*self.inner;
        *lock.lock().unwrap_or_else(PoisonError::into_inner) = status;
        cond.notify_all();
    }

    pub fn status(&self) -> TaskStatus {
        *self.inner.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Blocks while the work is pending and returns the settled status.
    pub fn wait(&self) -> TaskStatus {
        let (lock, cond) = &*self.inner;
        let guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
        *cond
            .wait_while(guard, |status| *status == TaskStatus::Pending)
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Like [`wait`](Self::wait), giving up after `timeout`. Returns `Pending` on timeout.
    pub fn wait_timeout(&self, timeout: Duration) -> TaskStatus {
        let (lock, cond) = &*self.inner;
        let guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
        let (status, _) = cond
            .wait_timeout_while(guard, timeout, |status| *status == TaskStatus::Pending)
            .unwrap_or_else(PoisonError::into_inner);
        *status
    }
}

type Callback<C> = Box<dyn Fn(&C) + Send + Sync>;

struct BottomHalfInner<C> {
    callback: Callback<C>,
    completion: Completion,
}

/// Reusable deferred callback. Clones share the same pending state.
pub struct BottomHalf<C> {
    inner: Arc<BottomHalfInner<C>>,
}

impl<C> Clone for BottomHalf<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C> BottomHalf<C> {
    pub fn new(callback: impl Fn(&C) + Send + Sync + 'static) -> Self {
        Self {
            inner: Arc::new(BottomHalfInner {
                callback: Box::new(callback),
                completion: Completion::new(TaskStatus::Idle),
            }),
        }
    }

    pub fn status(&self) -> TaskStatus {
        self.inner.completion.status()
    }

    pub fn completion(&self) -> Completion {
        self.inner.completion.clone()
    }
}

enum Job<C> {
    Reusable(BottomHalf<C>),
    Once {
        task: Box<dyn FnOnce(&C) + Send>,
        done: Completion,
    },
}

impl<C> Job<C> {
    fn run(self, ctx: &C) {
        match self {
            Job::Reusable(bh) => {
                (bh.inner.callback)(ctx);
                bh.inner.completion.set(TaskStatus::Done);
            }
            Job::Once { task, done } => {
                task(ctx);
                done.set(TaskStatus::Done);
            }
        }
    }

    fn cancel(self) {
        match self {
            Job::Reusable(bh) => bh.inner.completion.set(TaskStatus::Cancelled),
            Job::Once { done, .. } => done.set(TaskStatus::Cancelled),
        }
    }
}

struct QueueState<C> {
    jobs: VecDeque<Job<C>>,
    open: bool,
}

/// FIFO of deferred work. Submissions are refused while the queue is closed.
pub struct TaskQueue<C> {
    state: Mutex<QueueState<C>>,
    signal: Condvar,
}

impl<C> Default for TaskQueue<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> TaskQueue<C> {
    /// A closed, empty queue.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                jobs: VecDeque::new(),
                open: false,
            }),
            signal: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState<C>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn open(&self) {
        self.lock().open = true;
    }

    /// Refuses further submissions and wakes the drainer.
    pub fn close(&self) {
        let mut state = self.lock();
        state.open = false;
        self.signal.notify_all();
    }

    pub fn is_open(&self) -> bool {
        self.lock().open
    }

    pub fn len(&self) -> usize {
        self.lock().jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Queue a reusable bottom half. Returns `false` if the queue is closed or
    /// the bottom half is already pending.
    pub fn submit(&self, bh: &BottomHalf<C>) -> bool {
        let mut state = self.lock();
        Self::enqueue(&mut state, &self.signal, bh)
    }

    /// Like [`submit`](Self::submit) but never blocks: if the lock is contended the
    /// submission is dropped.
    pub fn submit_or_drop(&self, bh: &BottomHalf<C>) -> bool {
        let mut state = match self.state.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => {
                trace!("TaskQueue: lock contended, tick dropped");
                return false;
            }
        };
        Self::enqueue(&mut state, &self.signal, bh)
    }

    /// Queue a one-shot task. `None` if the queue is closed.
    pub fn submit_once(&self, task: impl FnOnce(&C) + Send + 'static) -> Option<Completion> {
        let mut state = self.lock();
        if !state.open {
            return None;
        }
        let done = Completion::new(TaskStatus::Pending);
        state.jobs.push_back(Job::Once {
            task: Box::new(task),
            done: done.clone(),
        });
        self.signal.notify_one();
        Some(done)
    }

    fn enqueue(state: &mut QueueState<C>, signal: &Condvar, bh: &BottomHalf<C>) -> bool {
        if !state.open {
            return false;
        }
        // The pending check and the status update happen under the queue lock.
        if bh.status() == TaskStatus::Pending {
            return false;
        }
        bh.inner.completion.set(TaskStatus::Pending);
        state.jobs.push_back(Job::Reusable(bh.clone()));
        signal.notify_one();
        true
    }

    /// Run everything currently queued without waiting. Returns the number of jobs run.
    pub fn drain(&self, ctx: &C) -> usize {
        let mut state = self.lock();
        Self::run_all(&mut state, ctx)
    }

    /// Wait until work arrives or the queue closes, then run everything queued.
    ///
    /// Returns `false` once the queue is closed; queued work is then left in place
    /// for [`cancel_pending`](Self::cancel_pending).
    pub fn wait_and_drain(&self, ctx: &C) -> bool {
        let state = self.lock();
        let mut state = self
            .signal
            .wait_while(state, |s| s.open && s.jobs.is_empty())
            .unwrap_or_else(PoisonError::into_inner);
        if !state.open {
            return false;
        }
        Self::run_all(&mut state, ctx);
        true
    }

    fn run_all(state: &mut QueueState<C>, ctx: &C) -> usize {
        let started = Instant::now();
        let mut ran = 0;
        while let Some(job) = state.jobs.pop_front() {
            job.run(ctx);
            ran += 1;
        }
        if ran > 0 {
            trace!("TaskQueue: ran {} job(s) in {:?}", ran, started.elapsed());
        }
        ran
    }

    /// Drop all queued work, marking it `Cancelled`. Returns how many jobs were dropped.
    pub fn cancel_pending(&self) -> usize {
        let jobs: Vec<_> = self.lock().jobs.drain(..).collect();
        let count = jobs.len();
        for job in jobs {
            job.cancel();
        }
        if count > 0 {
            debug!("TaskQueue: cancelled {} pending job(s)", count);
        }
        count
    }
}
