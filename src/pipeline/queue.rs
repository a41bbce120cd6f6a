//! In-process task queue with delayed scheduling.
//!
//! A timer thread holds scheduled tasks until they are due and hands them to
//! a fixed set of worker threads. Follow-up tasks returned by a worker go
//! back through the timer, so stages chain by enqueueing rather than
//! blocking each other.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};

use crate::error::{Error, Result};

use super::{Scheduled, Task};

/// Runs one task and returns its follow-ups.
pub trait TaskExecutor: Send + Sync {
    fn execute(&self, task: &Task) -> Result<Vec<Scheduled>>;
}

enum Command {
    Schedule(Scheduled),
    Shutdown,
}

struct Entry {
    due: Instant,
    seq: u64,
    task: Task,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    // Reversed so the max-heap pops the earliest task first.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .due
            .cmp(&self.due)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Count of tasks submitted but not yet finished.
#[derive(Default)]
struct Outstanding {
    count: Mutex<usize>,
    idle: Condvar,
}

impl Outstanding {
    fn add(&self) {
        let mut count = self.count.lock().unwrap_or_else(|e| e.into_inner());
        *count += 1;
    }

    fn done(&self) {
        let mut count = self.count.lock().unwrap_or_else(|e| e.into_inner());
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.idle.notify_all();
        }
    }

    fn wait_idle(&self, timeout: Duration) -> bool {
        let count = self.count.lock().unwrap_or_else(|e| e.into_inner());
        let (count, _) = self
            .idle
            .wait_timeout_while(count, timeout, |count| *count > 0)
            .unwrap_or_else(|e| e.into_inner());
        *count == 0
    }
}

/// Fixed-size pool of worker threads fed by a delay queue.
pub struct WorkerPool {
    commands: Sender<Command>,
    outstanding: Arc<Outstanding>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Start `workers` worker threads (at least one) running `executor`.
    pub fn new(executor: Arc<dyn TaskExecutor>, workers: usize) -> Result<Self> {
        let (command_tx, command_rx) = unbounded::<Command>();
        let (task_tx, task_rx) = unbounded::<Task>();
        let outstanding = Arc::new(Outstanding::default());
        let mut handles = Vec::with_capacity(workers.max(1) + 1);

        handles.push(
            thread::Builder::new()
                .name("doccheck-timer".to_string())
                .spawn(move || run_timer(command_rx, task_tx))?,
        );

        for i in 0..workers.max(1) {
            let tasks = task_rx.clone();
            let commands = command_tx.clone();
            let executor = Arc::clone(&executor);
            let outstanding = Arc::clone(&outstanding);
            handles.push(
                thread::Builder::new()
                    .name(format!("doccheck-worker-{}", i))
                    .spawn(move || run_worker(tasks, commands, executor, outstanding))?,
            );
        }

        Ok(Self {
            commands: command_tx,
            outstanding,
            handles,
        })
    }

    /// Enqueue a task to run after its delay.
    pub fn submit(&self, scheduled: Scheduled) -> Result<()> {
        self.outstanding.add();
        self.commands
            .send(Command::Schedule(scheduled))
            .map_err(|_| {
                self.outstanding.done();
                Error::Other("worker pool is shut down".to_string())
            })
    }

    /// Block until no task is queued or running, or `timeout` elapses.
    ///
    /// Returns whether the pool became idle.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        self.outstanding.wait_idle(timeout)
    }

    /// Stop the pool. Tasks still waiting for their delay are dropped.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        let _ = self.commands.send(Command::Shutdown);
        for handle in self.handles.drain(..) {
            if handle.join().is_err() {
                log::error!("Worker thread panicked");
            }
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        if !self.handles.is_empty() {
            self.stop();
        }
    }
}

fn run_timer(commands: Receiver<Command>, tasks: Sender<Task>) {
    let mut queue: BinaryHeap<Entry> = BinaryHeap::new();
    let mut seq = 0u64;

    loop {
        let now = Instant::now();
        while queue.peek().is_some_and(|entry| entry.due <= now) {
            if let Some(entry) = queue.pop() {
                if tasks.send(entry.task).is_err() {
                    return;
                }
            }
        }

        let command = match queue.peek() {
            Some(entry) => commands.recv_timeout(entry.due.saturating_duration_since(Instant::now())),
            None => commands.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };

        match command {
            Ok(Command::Schedule(scheduled)) => {
                seq += 1;
                queue.push(Entry {
                    due: Instant::now() + scheduled.delay,
                    seq,
                    task: scheduled.task,
                });
            }
            Ok(Command::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {}
        }
    }

    if !queue.is_empty() {
        log::debug!("Dropping {} scheduled task(s) on shutdown", queue.len());
    }
}

fn run_worker(
    tasks: Receiver<Task>,
    commands: Sender<Command>,
    executor: Arc<dyn TaskExecutor>,
    outstanding: Arc<Outstanding>,
) {
    for task in tasks.iter() {
        match executor.execute(&task) {
            Ok(follow_ups) => {
                for scheduled in follow_ups {
                    outstanding.add();
                    if commands.send(Command::Schedule(scheduled)).is_err() {
                        outstanding.done();
                    }
                }
            }
            Err(e) => log::error!("{:?} failed: {}", task, e),
        }
        outstanding.done();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering as AtomicOrdering};

    /// Counts down through `UpdateTitle` tasks, rescheduling itself.
    struct Countdown {
        runs: AtomicU32,
    }

    impl TaskExecutor for Countdown {
        fn execute(&self, task: &Task) -> Result<Vec<Scheduled>> {
            self.runs.fetch_add(1, AtomicOrdering::SeqCst);
            match task {
                Task::UpdateTitle { id, title } if title != "0" => {
                    let next: u32 = title.parse().map_err(|_| Error::Other("bad count".into()))?;
                    Ok(vec![Scheduled::after(
                        Task::UpdateTitle {
                            id: id.clone(),
                            title: (next - 1).to_string(),
                        },
                        Duration::from_millis(5),
                    )])
                }
                _ => Ok(Vec::new()),
            }
        }
    }

    #[test]
    fn test_follow_ups_run_until_idle() {
        let executor = Arc::new(Countdown {
            runs: AtomicU32::new(0),
        });
        let pool = WorkerPool::new(executor.clone(), 2).unwrap();
        pool.submit(Scheduled::now(Task::UpdateTitle {
            id: "job".into(),
            title: "3".into(),
        }))
        .unwrap();

        assert!(pool.wait_idle(Duration::from_secs(5)));
        assert_eq!(executor.runs.load(AtomicOrdering::SeqCst), 4);
        pool.shutdown();
    }

    #[test]
    fn test_delayed_task_waits() {
        let executor = Arc::new(Countdown {
            runs: AtomicU32::new(0),
        });
        let pool = WorkerPool::new(executor.clone(), 1).unwrap();
        pool.submit(Scheduled::after(
            Task::StartProcessing { id: "job".into() },
            Duration::from_millis(200),
        ))
        .unwrap();

        assert!(!pool.wait_idle(Duration::from_millis(20)));
        assert_eq!(executor.runs.load(AtomicOrdering::SeqCst), 0);
        assert!(pool.wait_idle(Duration::from_secs(5)));
        assert_eq!(executor.runs.load(AtomicOrdering::SeqCst), 1);
    }

    #[test]
    fn test_entry_order_earliest_first() {
        let now = Instant::now();
        let mut heap = BinaryHeap::new();
        for (offset, seq) in [(30u64, 1u64), (10, 2), (10, 3)] {
            heap.push(Entry {
                due: now + Duration::from_millis(offset),
                seq,
                task: Task::StartProcessing { id: seq.to_string() },
            });
        }
        let order: Vec<u64> = std::iter::from_fn(|| heap.pop().map(|e| e.seq)).collect();
        assert_eq!(order, vec![2, 3, 1]);
    }
}
