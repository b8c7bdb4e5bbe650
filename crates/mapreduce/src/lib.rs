//! A multi-threaded MapReduce execution engine.
//!
//! A job runs `map -> shuffle -> reduce` over N OS worker threads. Workers
//! pull input pairs from a shared counter and emit intermediate pairs into
//! per-worker buffers; after a barrier, worker 0 groups all intermediate
//! pairs by key onto a shared stack; after a second barrier, all workers
//! reduce groups concurrently. Progress is observable at any time through
//! [`JobHandle::state`] as a `{stage, percentage}` snapshot.

mod client;
mod job;
mod status;

pub use client::{MapOutput, MapReduceClient, ReduceOutput};
pub use job::{start_job, JobHandle};
pub use status::{JobState, Stage};
