use crate::job::JobInner;
use std::sync::atomic::{AtomicUsize, Ordering};

/// User-supplied map and reduce logic together with the key/value types the
/// engine shuttles around.
///
/// `K2` is the shuffle key; its `Ord` drives the per-worker sort and the
/// grouping of intermediate pairs. Two keys belong to the same group when
/// they compare equal.
pub trait MapReduceClient: Sized + Send + Sync + 'static {
    type K1: Send + Sync + 'static;
    type V1: Send + Sync + 'static;
    type K2: Ord + Send + 'static;
    type V2: Send + 'static;
    type K3: Send + 'static;
    type V3: Send + 'static;

    /// Called once per input pair, possibly concurrently from several
    /// workers. Emit intermediate pairs through `out`.
    fn map(&self, key: &Self::K1, value: &Self::V1, out: &mut MapOutput<'_, Self>);

    /// Called once per key group. Every pair in `group` has the same `K2`.
    /// Emit output pairs through `out`.
    fn reduce(&self, group: &[(Self::K2, Self::V2)], out: &mut ReduceOutput<'_, Self>);
}

/// Sink handed to [`MapReduceClient::map`]; routes pairs into the calling
/// worker's intermediate buffer.
pub struct MapOutput<'a, C: MapReduceClient> {
    pub(crate) buffer: &'a mut Vec<(C::K2, C::V2)>,
    pub(crate) emitted: &'a AtomicUsize,
}

impl<C: MapReduceClient> MapOutput<'_, C> {
    /// Emit one intermediate pair.
    pub fn emit2(&mut self, key: C::K2, value: C::V2) {
        self.buffer.push((key, value));
        self.emitted.fetch_add(1, Ordering::Relaxed);
    }
}

/// Sink handed to [`MapReduceClient::reduce`]; appends to the job output
/// under the output lock.
pub struct ReduceOutput<'a, C: MapReduceClient> {
    pub(crate) job: &'a JobInner<C>,
}

impl<C: MapReduceClient> ReduceOutput<'_, C> {
    /// Emit one output pair.
    pub fn emit3(&mut self, key: C::K3, value: C::V3) {
        self.job.push_output(key, value);
    }
}
