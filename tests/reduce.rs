mod support;

use forkjoin_core::ops::{call, join};
use forkjoin_core::sync_wait;
use support::{InlinePool, StaticPool};

const GRAIN: usize = 2;

fn reduce_sum(values: &[f64]) -> f64 {
    if values.len() <= GRAIN {
        return values.iter().sum();
    }
    let mid = values.len() / 2;
    let (left, right) = values.split_at(mid);
    if values.len() <= GRAIN * 4 {
        return call(|| reduce_sum(left)) + call(|| reduce_sum(right));
    }
    let (a, b) = join(move || reduce_sum(left), move || reduce_sum(right));
    a + b
}

#[test]
fn reduce_one_to_five_sums_to_fifteen() {
    let values = vec![1.0, 2.0, 3.0, 4.0, 5.0];
    let pool = InlinePool::new();
    let total = sync_wait(&pool, move || reduce_sum(&values));
    assert_eq!(total, 15.0);
}

#[test]
fn reduce_large_range_matches_closed_form_across_worker_counts() {
    let values: Vec<f64> = (1..=2000).map(|i| i as f64).collect();
    let expected: f64 = values.iter().sum();
    for &workers in &[1usize, 2, 4] {
        let pool = StaticPool::new(workers);
        let values = values.clone();
        let total = sync_wait(&pool, move || reduce_sum(&values));
        assert_eq!(total, expected, "mismatch at worker count {}", workers);
    }
}
