use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use mapreduce::{start_job, MapOutput, MapReduceClient, ReduceOutput, Stage};

/// Sums values per key and records how many groups it saw.
struct Summer {
    groups_seen: AtomicUsize,
}

impl MapReduceClient for Summer {
    type K1 = i64;
    type V1 = i64;
    type K2 = i64;
    type V2 = i64;
    type K3 = i64;
    type V3 = i64;

    fn map(&self, key: &i64, value: &i64, out: &mut MapOutput<'_, Self>) {
        out.emit2(*key, *value);
    }

    fn reduce(&self, group: &[(i64, i64)], out: &mut ReduceOutput<'_, Self>) {
        assert!(!group.is_empty());
        self.groups_seen.fetch_add(1, Ordering::SeqCst);
        out.emit3(group[0].0, group.iter().map(|(_, v)| v).sum());
    }
}

#[test]
fn empty_input_completes_with_reduce_at_zero() {
    let output: Arc<Mutex<Vec<(i64, i64)>>> = Arc::new(Mutex::new(Vec::new()));
    let client = Arc::new(Summer {
        groups_seen: AtomicUsize::new(0),
    });
    let job = start_job(Arc::clone(&client), Vec::new(), Arc::clone(&output), 2);
    job.wait();

    let state = job.state();
    assert_eq!(state.stage, Stage::Reduce);
    assert_eq!(state.percentage, 0.0);
    job.close();

    assert!(output.lock().unwrap().is_empty());
    assert_eq!(client.groups_seen.load(Ordering::SeqCst), 0);
}

#[test]
fn single_pair_single_worker() {
    let output = Arc::new(Mutex::new(Vec::new()));
    let client = Arc::new(Summer {
        groups_seen: AtomicUsize::new(0),
    });
    let job = start_job(Arc::clone(&client), vec![(7, 42)], Arc::clone(&output), 1);
    job.close();

    assert_eq!(client.groups_seen.load(Ordering::SeqCst), 1);
    let output = output.lock().unwrap();
    assert_eq!(output.as_slice(), &[(7, 42)]);
}

#[test]
fn duplicate_keys_collapse_into_one_group() {
    let input: Vec<(i64, i64)> = (0..50).map(|i| (i % 3, 1)).collect();
    let output = Arc::new(Mutex::new(Vec::new()));
    let client = Arc::new(Summer {
        groups_seen: AtomicUsize::new(0),
    });
    let job = start_job(Arc::clone(&client), input, Arc::clone(&output), 3);
    job.close();

    // Three distinct keys, so exactly three groups and three output pairs.
    assert_eq!(client.groups_seen.load(Ordering::SeqCst), 3);
    let mut output = output.lock().unwrap().clone();
    output.sort();
    assert_eq!(output, vec![(0, 17), (1, 17), (2, 16)]);
}
