use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use mapreduce::{start_job, MapOutput, MapReduceClient, ReduceOutput, Stage};
use once_cell::sync::Lazy;

struct WordCount;

impl MapReduceClient for WordCount {
    type K1 = usize;
    type V1 = String;
    type K2 = String;
    type V2 = u32;
    type K3 = String;
    type V3 = u32;

    fn map(&self, _line_no: &usize, line: &String, out: &mut MapOutput<'_, Self>) {
        for word in line.split_whitespace() {
            out.emit2(word.to_string(), 1);
        }
    }

    fn reduce(&self, group: &[(String, u32)], out: &mut ReduceOutput<'_, Self>) {
        // Every pair in a group carries the same key.
        let (key, _) = &group[0];
        assert!(group.iter().all(|(k, _)| k == key));
        let total = group.iter().map(|(_, n)| n).sum();
        out.emit3(key.clone(), total);
    }
}

fn lines(text: &[&str]) -> Vec<(usize, String)> {
    text.iter()
        .enumerate()
        .map(|(i, line)| (i, line.to_string()))
        .collect()
}

fn run(input: Vec<(usize, String)>, workers: usize) -> HashMap<String, u32> {
    let output = Arc::new(Mutex::new(Vec::new()));
    let job = start_job(Arc::new(WordCount), input, Arc::clone(&output), workers);
    job.close();
    let output = output.lock().unwrap();
    let mut counts = HashMap::new();
    for (word, n) in output.iter() {
        // Exactly one output pair per reduced key.
        assert!(counts.insert(word.clone(), *n).is_none());
    }
    counts
}

#[test]
fn counts_words_across_workers() {
    let counts = run(lines(&["a a b", "b c", "a"]), 4);
    assert_eq!(counts.len(), 3);
    assert_eq!(counts["a"], 3);
    assert_eq!(counts["b"], 2);
    assert_eq!(counts["c"], 1);
}

#[test]
fn more_workers_than_input() {
    let counts = run(lines(&["solo"]), 8);
    assert_eq!(counts.len(), 1);
    assert_eq!(counts["solo"], 1);
}

static CORPUS: Lazy<Vec<(usize, String)>> = Lazy::new(|| {
    let words = ["pine", "oak", "elm", "ash", "fir"];
    (0..200)
        .map(|i| (i, format!("{} {}", words[i % 5], words[(i * 3) % 5])))
        .collect()
});

#[test]
fn large_input_reaches_reduce_with_full_progress() {
    let output = Arc::new(Mutex::new(Vec::new()));
    let job = start_job(Arc::new(WordCount), CORPUS.clone(), Arc::clone(&output), 4);

    // Stage only ever moves forward.
    let mut last = job.state();
    loop {
        let state = job.state();
        assert!(state.stage >= last.stage, "stage went backwards");
        assert!(state.percentage <= 100.0);
        last = state;
        if state.stage == Stage::Reduce && state.percentage >= 100.0 {
            break;
        }
        std::thread::yield_now();
    }
    job.wait();

    // 200 lines, 2 words each, 5 distinct words, 80 occurrences apiece.
    let counts = output.lock().unwrap();
    assert_eq!(counts.len(), 5);
    assert!(counts.iter().all(|(_, n)| *n == 80));
}
