// Job execution flow
// ------------------
// start_job spawns N OS workers, each running the same phase driver:
//
//   map -> local sort -> barrier -> (shuffle, worker 0 only) -> barrier
//       -> reduce
//
// Map pulls input indices from a shared atomic counter, so workers drain
// the input at their own pace. Each worker emits into its own intermediate
// buffer and sorts it by key before the first barrier. After that barrier
// no worker touches its buffer again, which is what makes it safe for
// worker 0 to drain all of them during the shuffle: it grabs every buffer
// lock up front and holds them for the whole stage, popping the globally
// largest key and collecting its equals from every buffer into one group.
// Groups land on a shared stack; reducers pop from it under the reduce
// lock until it runs dry.

use std::cmp::Ordering as CmpOrdering;
use std::process;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, Mutex, MutexGuard};
use std::thread;

use crate::client::{MapOutput, MapReduceClient, ReduceOutput};
use crate::status::{JobState, Stage, StatusWord};

pub(crate) mod msg {
    pub const CREATE_THREAD: &str = "failed to create a worker thread";
    pub const JOIN_THREAD: &str = "failed to join a worker thread";
    pub const POISONED_LOCK: &str = "a worker panicked while holding a job lock";
}

pub(crate) fn fatal(message: &str) -> ! {
    eprintln!("system error: {message}");
    process::exit(1);
}

/// Acquire a job lock or die: a panicked worker leaves the job in an
/// unknown state, and the engine has no recovery path for that.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(_) => fatal(msg::POISONED_LOCK),
    }
}

/// Shared state of one job. Owned by an `Arc` held by the handle and by
/// every worker thread.
pub struct JobInner<C: MapReduceClient> {
    client: Arc<C>,
    input: Vec<(C::K1, C::V1)>,
    output: Arc<Mutex<Vec<(C::K3, C::V3)>>>,
    /// One intermediate buffer per worker. Only the owning worker pushes;
    /// worker 0 drains them all during the shuffle, after the barrier has
    /// guaranteed the owners are done.
    workers: Vec<Mutex<Vec<(C::K2, C::V2)>>>,
    /// Stack of key groups produced by the shuffler, drained by reducers.
    shuffled: Mutex<Vec<Vec<(C::K2, C::V2)>>>,
    map_next: AtomicUsize,
    intermediate_emitted: AtomicUsize,
    shuffle_pushed: AtomicUsize,
    reduced_groups: AtomicUsize,
    status: StatusWord,
    barrier: Barrier,
}

impl<C: MapReduceClient> JobInner<C> {
    pub(crate) fn push_output(&self, key: C::K3, value: C::V3) {
        lock(&self.output).push((key, value));
        self.status.add_done(1);
    }
}

/// Handle to a running job.
pub struct JobHandle<C: MapReduceClient> {
    inner: Arc<JobInner<C>>,
    /// Drained by the first `wait`; later calls see an empty list.
    threads: Mutex<Vec<thread::JoinHandle<()>>>,
}

/// Start a job over `input` with `workers` OS threads. Output pairs are
/// appended to `output`, which the caller keeps a clone of; it is fully
/// populated once [`JobHandle::wait`] (or `close`) has returned.
pub fn start_job<C: MapReduceClient>(
    client: Arc<C>,
    input: Vec<(C::K1, C::V1)>,
    output: Arc<Mutex<Vec<(C::K3, C::V3)>>>,
    workers: usize,
) -> JobHandle<C> {
    let input_len = input.len();
    let inner = Arc::new(JobInner {
        client,
        input,
        output,
        workers: (0..workers).map(|_| Mutex::new(Vec::new())).collect(),
        shuffled: Mutex::new(Vec::new()),
        map_next: AtomicUsize::new(0),
        intermediate_emitted: AtomicUsize::new(0),
        shuffle_pushed: AtomicUsize::new(0),
        reduced_groups: AtomicUsize::new(0),
        status: StatusWord::new(),
        barrier: Barrier::new(workers),
    });
    // Enter the map stage before any worker exists: a fast worker could
    // already be shuffling or reducing by the time spawning finishes, and
    // the stage must never move backwards.
    inner.status.begin_stage(Stage::Map, input_len);

    let mut handles = Vec::with_capacity(workers);
    for tid in 0..workers {
        let inner = Arc::clone(&inner);
        let handle = thread::Builder::new()
            .name(format!("mr-worker-{tid}"))
            .spawn(move || worker_loop(&inner, tid));
        match handle {
            Ok(handle) => handles.push(handle),
            Err(_) => fatal(msg::CREATE_THREAD),
        }
    }

    JobHandle {
        inner,
        threads: Mutex::new(handles),
    }
}

impl<C: MapReduceClient> JobHandle<C> {
    /// Block until every worker has exited. Idempotent.
    pub fn wait(&self) {
        let mut threads = lock(&self.threads);
        for handle in threads.drain(..) {
            if handle.join().is_err() {
                fatal(msg::JOIN_THREAD);
            }
        }
    }

    /// A consistent `{stage, percentage}` snapshot of the job's progress.
    pub fn state(&self) -> JobState {
        self.inner.status.snapshot()
    }

    /// Wait for completion and release the engine side of the job. The
    /// caller's clone of the output vector holds the results.
    pub fn close(self) {
        self.wait();
    }
}

fn worker_loop<C: MapReduceClient>(inner: &JobInner<C>, tid: usize) {
    // Map: claim input pairs until the shared counter runs past the end.
    loop {
        let index = inner.map_next.fetch_add(1, Ordering::SeqCst);
        if index >= inner.input.len() {
            break;
        }
        let (key, value) = &inner.input[index];
        {
            let mut buffer = lock(&inner.workers[tid]);
            let mut out = MapOutput {
                buffer: &mut *buffer,
                emitted: &inner.intermediate_emitted,
            };
            inner.client.map(key, value, &mut out);
        }
        inner.status.add_done(1);
    }

    // Local sort by key; ties keep emission order.
    lock(&inner.workers[tid]).sort_by(|a, b| a.0.cmp(&b.0));

    inner.barrier.wait();
    if tid == 0 {
        shuffle(inner);
    }
    inner.barrier.wait();

    // Reduce: pop groups off the shared stack until it is empty.
    loop {
        let group = match lock(&inner.shuffled).pop() {
            Some(group) => group,
            None => break,
        };
        let mut out = ReduceOutput { job: inner };
        inner.client.reduce(&group, &mut out);
        inner.reduced_groups.fetch_add(1, Ordering::SeqCst);
    }
}

/// Drain all worker buffers into key groups. Runs on worker 0 only, between
/// the two barriers, so the buffer locks are uncontended by construction.
fn shuffle<C: MapReduceClient>(inner: &JobInner<C>) {
    let total = inner.intermediate_emitted.load(Ordering::SeqCst);
    inner.status.begin_stage(Stage::Shuffle, total);

    let mut buffers: Vec<_> = inner.workers.iter().map(lock).collect();
    loop {
        // The buffers are sorted, so each back element is its buffer's
        // maximum; the largest of those is the global maximum key.
        let mut max_at: Option<usize> = None;
        for i in 0..buffers.len() {
            if buffers[i].is_empty() {
                continue;
            }
            max_at = match max_at {
                None => Some(i),
                Some(j) => match (buffers[i].last(), buffers[j].last()) {
                    (Some((ki, _)), Some((kj, _))) if ki.cmp(kj) == CmpOrdering::Greater => Some(i),
                    _ => Some(j),
                },
            };
        }
        let Some(max_at) = max_at else { break };

        let (max_key, max_value) = match buffers[max_at].pop() {
            Some(pair) => pair,
            None => break,
        };
        inner.status.add_done(1);

        // Collect every pair whose key equals the maximum, across all
        // buffers; they sit at the backs because the buffers are sorted.
        let mut group = Vec::new();
        for buffer in buffers.iter_mut() {
            while buffer
                .last()
                .is_some_and(|(key, _)| key.cmp(&max_key) == CmpOrdering::Equal)
            {
                if let Some(pair) = buffer.pop() {
                    group.push(pair);
                    inner.status.add_done(1);
                }
            }
        }
        group.push((max_key, max_value));

        lock(&inner.shuffled).push(group);
        inner.shuffle_pushed.fetch_add(1, Ordering::SeqCst);
    }

    let pushed = inner.shuffle_pushed.load(Ordering::SeqCst);
    inner.status.begin_stage(Stage::Reduce, pushed);
}
