use std::{
    any::Any,
    collections::{HashMap, VecDeque},
    panic::{self, AssertUnwindSafe},
    sync::Arc,
    thread::{self, ThreadId},
};

use parking_lot::Mutex;
use tracing::{debug, error};

use crate::error::TaskError;

pub type TaskId = u64;

type Payload = Box<dyn Any + Send>;
type FrameCallback<C> = Box<dyn FnOnce(&mut C, &mut TaskScheduler<C>)>;
type Continuation<C> = Box<dyn FnOnce(&mut C, &mut TaskScheduler<C>, Result<Payload, TaskError>)>;
type CompletionQueue = Arc<Mutex<VecDeque<(TaskId, Result<Payload, TaskError>)>>>;

struct FrameTask<C> {
    remaining: u32,
    callback: FrameCallback<C>,
}

////////////////////////////////////////////////
/// TaskScheduler
/// * Frame-delayed tasks: counted down once per `update`, run in enqueue
///   order when they reach zero.
/// * Parallel tasks: the body runs on its own worker thread, its continuation runs
///   inside a later `update` on the thread that owns the scheduler, in
///   completion order.
/// * Callbacks receive the frame context `C` and the scheduler itself, so
///   they may enqueue more work.
/// * Continuations are not `Send`, which makes the scheduler `!Send` and keeps
///   every continuation on the owning thread. Only bodies cross threads.
////////////////////////////////////////////////
pub struct TaskScheduler<C> {
    frame_tasks: VecDeque<FrameTask<C>>,
    continuations: HashMap<TaskId, Continuation<C>>,
    completed: CompletionQueue,
    next_id: TaskId,
    owner: ThreadId,
}

impl<C: 'static> Default for TaskScheduler<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: 'static> TaskScheduler<C> {
    pub fn new() -> Self {
        Self {
            frame_tasks: VecDeque::new(),
            continuations: HashMap::new(),
            completed: Arc::new(Mutex::new(VecDeque::new())),
            next_id: 0,
            owner: thread::current().id(),
        }
    }

    pub fn owner(&self) -> ThreadId {
        self.owner
    }

    /// Runs `task` on the `n_frames`-th following update. Zero behaves like one.
    pub fn schedule<F>(&mut self, n_frames: u32, task: F)
    where
        F: FnOnce(&mut C, &mut TaskScheduler<C>) + 'static,
    {
        self.frame_tasks.push_back(FrameTask {
            remaining: n_frames,
            callback: Box::new(task),
        });
    }

    /// Dispatches `body` to a worker right away. `then` receives its value, or
    /// the panic it raised, during a later update on the owning thread.
    pub fn spawn<T, B, K>(&mut self, body: B, then: K) -> TaskId
    where
        T: Send + 'static,
        B: FnOnce() -> T + Send + 'static,
        K: FnOnce(&mut C, &mut TaskScheduler<C>, Result<T, TaskError>) + 'static,
    {
        let id = self.next_id;
        self.next_id += 1;

        let continuation: Continuation<C> = Box::new(
            move |ctx: &mut C, scheduler: &mut TaskScheduler<C>, outcome: Result<Payload, TaskError>| {
                let typed = outcome.and_then(|payload| {
                    payload.downcast::<T>().map(|value| *value).map_err(|_| {
                        error!(task = id, "parallel task payload has an unexpected type");
                        TaskError::UnexpectedPayload(id)
                    })
                });
                then(ctx, scheduler, typed)
            },
        );
        self.continuations.insert(id, continuation);

        let completed = Arc::clone(&self.completed);
        let worker = Arc::clone(&self.completed);
        let spawned = thread::Builder::new()
            .name(format!("relief-task-{id}"))
            .spawn(move || {
                let outcome = panic::catch_unwind(AssertUnwindSafe(body))
                    .map(|value| Box::new(value) as Payload)
                    .map_err(|panic| TaskError::Panicked(panic_message(panic.as_ref())));
                worker.lock().push_back((id, outcome));
            });
        if let Err(err) = spawned {
            error!(task = id, error = %err, "failed to start worker thread");
            completed
                .lock()
                .push_back((id, Err(TaskError::Spawn(err.to_string()))));
        }

        debug!(task = id, "parallel task dispatched");
        id
    }

    /// One frame tick: frame-delayed tasks first, then the continuations of
    /// every parallel task that completed since the previous tick.
    pub fn update(&mut self, ctx: &mut C) {
        debug_assert_eq!(thread::current().id(), self.owner);

        let mut due = Vec::new();
        for mut task in std::mem::take(&mut self.frame_tasks) {
            task.remaining = task.remaining.saturating_sub(1);
            if task.remaining == 0 {
                due.push(task.callback);
            } else {
                self.frame_tasks.push_back(task);
            }
        }
        for callback in due {
            callback(ctx, self);
        }

        let completed: Vec<_> = self.completed.lock().drain(..).collect();
        for (id, outcome) in completed {
            match self.continuations.remove(&id) {
                Some(continuation) => {
                    debug!(task = id, ok = outcome.is_ok(), "running continuation");
                    continuation(ctx, self, outcome);
                }
                None => error!(task = id, "completion without a continuation"),
            }
        }
    }

    pub fn pending_frame_tasks(&self) -> usize {
        self.frame_tasks.len()
    }

    /// Parallel tasks whose continuation has not run yet.
    pub fn running_tasks(&self) -> usize {
        self.continuations.len()
    }

    pub fn is_idle(&self) -> bool {
        self.frame_tasks.is_empty() && self.continuations.is_empty()
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
