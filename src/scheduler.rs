//! Cooperative, single-threaded job queue for lifecycle callbacks and deferred re-renders.

use core::{
	cell::{Cell, RefCell},
	fmt::{self, Debug, Formatter},
	future::Future,
};
use futures::{
	executor::{LocalPool, LocalSpawner},
	future::{FutureExt, LocalBoxFuture},
	task::LocalSpawnExt,
};
use std::{
	collections::VecDeque,
	panic::{self, AssertUnwindSafe},
	rc::{Rc, Weak},
};
use tracing::{error, instrument, trace, trace_span, warn};

pub type JobResult = anyhow::Result<()>;

/// What a job leaves behind.
pub enum Completion {
	Ready(JobResult),
	/// Driven by the scheduler's executor. Its failure is logged once it resolves.
	Deferred(LocalBoxFuture<'static, JobResult>),
}
impl Completion {
	#[must_use]
	pub fn ok() -> Self {
		Completion::Ready(Ok(()))
	}

	pub fn deferred(future: impl 'static + Future<Output = JobResult>) -> Self {
		Completion::Deferred(future.boxed_local())
	}
}
impl From<JobResult> for Completion {
	fn from(result: JobResult) -> Self {
		Completion::Ready(result)
	}
}
impl Debug for Completion {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		match self {
			Completion::Ready(result) => f.debug_tuple("Ready").field(result).finish(),
			Completion::Deferred(_) => f.write_str("Deferred(..)"),
		}
	}
}

type Job = Box<dyn FnOnce() -> Completion>;

struct Shared {
	jobs: RefCell<VecDeque<Job>>,
	scheduled: Cell<bool>,
	draining: Cell<bool>,
	pool: RefCell<LocalPool>,
	spawner: LocalSpawner,
	wake: Option<Box<dyn Fn(&Scheduler)>>,
}

/// FIFO job queue, drained explicitly (or through a wake-up hook).
///
/// Clones share the same queue.
/// Jobs enqueued while draining run in the same drain, after everything that was queued before them.
/// A failing (or panicking) job is logged and skipped. It never stops the drain.
#[derive(Clone)]
pub struct Scheduler(Rc<Shared>);

#[derive(Clone)]
pub struct WeakScheduler(Weak<Shared>);
impl WeakScheduler {
	#[must_use]
	pub fn upgrade(&self) -> Option<Scheduler> {
		self.0.upgrade().map(Scheduler)
	}
}

impl Default for Scheduler {
	fn default() -> Self {
		Self::new()
	}
}

impl Scheduler {
	/// A scheduler that is drained only by [`Scheduler::settle`] or [`Scheduler::drain`].
	#[must_use]
	pub fn new() -> Self {
		Self::build(None)
	}

	/// A scheduler that calls `wake` whenever a drain becomes pending.
	///
	/// `wake` should arrange for [`Scheduler::drain`] to be called soon, but not synchronously.
	pub fn with_wake(wake: impl 'static + Fn(&Scheduler)) -> Self {
		Self::build(Some(Box::new(wake)))
	}

	fn build(wake: Option<Box<dyn Fn(&Scheduler)>>) -> Self {
		let pool = LocalPool::new();
		let spawner = pool.spawner();
		Self(Rc::new(Shared {
			jobs: RefCell::default(),
			scheduled: Cell::new(false),
			draining: Cell::new(false),
			pool: RefCell::new(pool),
			spawner,
			wake,
		}))
	}

	#[must_use]
	pub fn downgrade(&self) -> WeakScheduler {
		WeakScheduler(Rc::downgrade(&self.0))
	}

	pub fn enqueue(&self, job: impl 'static + FnOnce() -> Completion) {
		self.0.jobs.borrow_mut().push_back(Box::new(job));
		self.schedule();
	}

	/// The number of jobs waiting for the next drain.
	#[must_use]
	pub fn pending(&self) -> usize {
		self.0.jobs.borrow().len()
	}

	/// Whether a drain is pending.
	#[must_use]
	pub fn is_scheduled(&self) -> bool {
		self.0.scheduled.get()
	}

	fn schedule(&self) {
		if self.0.scheduled.replace(true) {
			return;
		}
		trace!("Drain scheduled.");
		if let Some(wake) = &self.0.wake {
			wake(self)
		}
	}

	/// Runs jobs and deferred completions until there is nothing left that can make progress.
	///
	/// Returns the number of jobs that ran. Calling this from inside a drain does nothing and returns 0.
	#[instrument(skip(self))]
	pub fn drain(&self) -> usize {
		if self.0.draining.replace(true) {
			trace!("Already draining.");
			return 0;
		}
		let _guard = DrainGuard(&self.0);

		let mut count = 0;
		loop {
			loop {
				let job = self.0.jobs.borrow_mut().pop_front();
				match job {
					Some(job) => {
						self.run(job);
						count += 1;
					}
					None => break,
				}
			}

			match self.0.pool.try_borrow_mut() {
				Ok(mut pool) => pool.run_until_stalled(),
				Err(_) => warn!("Executor is busy. Deferred completions will be polled on the next drain."),
			}

			if self.0.jobs.borrow().is_empty() {
				break;
			}
		}

		trace!("Drained {} job(s).", count);
		count
	}

	/// Waits for pending work to complete, i.e. drains to quiescence.
	///
	/// Deferred completions that are blocked on something outside the scheduler stay pending.
	pub fn settle(&self) {
		self.drain();
	}

	fn run(&self, job: Job) {
		let span = trace_span!("Running job");
		let _enter = span.enter();

		let completion = match panic::catch_unwind(AssertUnwindSafe(job)) {
			Ok(completion) => completion,
			Err(_) => return error!("[scheduler]: Job panicked."),
		};

		match completion {
			Completion::Ready(Ok(())) => (),
			Completion::Ready(Err(error)) => error!("[scheduler]: {:#}", error),
			Completion::Deferred(future) => {
				let task = AssertUnwindSafe(future).catch_unwind().map(|result| match result {
					Ok(Ok(())) => (),
					Ok(Err(error)) => error!("[scheduler]: {:#}", error),
					Err(_) => error!("[scheduler]: Deferred completion panicked."),
				});
				if let Err(error) = self.0.spawner.spawn_local(task) {
					error!("[scheduler]: Failed to spawn deferred completion: {}", error)
				}
			}
		}
	}
}

/// Ends a drain even if it unwinds.
struct DrainGuard<'a>(&'a Shared);
impl Drop for DrainGuard<'_> {
	fn drop(&mut self) {
		self.0.scheduled.set(false);
		self.0.draining.set(false);
	}
}

impl Debug for Scheduler {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("Scheduler")
			.field("pending", &self.pending())
			.field("scheduled", &self.is_scheduled())
			.field("draining", &self.0.draining.get())
			.finish()
	}
}
