//! Bounded worker pool over triples.

use rayon::prelude::*;

use crate::{FlowError, FlowResult};

use super::cancel::CancelToken;

/// Runs one job per item on at most `jobs` worker threads.
///
/// Results come back in item order whatever the completion order. Once the
/// cancel token is set no further item is admitted; those slots are `None`.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    jobs: usize,
    cancel: CancelToken,
}

impl WorkerPool {
    pub fn new(jobs: usize) -> Self {
        WorkerPool {
            jobs: jobs.max(1),
            cancel: CancelToken::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn jobs(&self) -> usize {
        self.jobs
    }

    pub fn run<T, R, F>(&self, items: &[T], job: F) -> FlowResult<Vec<Option<R>>>
    where
        T: Sync,
        R: Send,
        F: Fn(&T) -> R + Sync,
    {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.jobs)
            .thread_name(|i| format!("vtr-worker-{i}"))
            .build()
            .map_err(|e| FlowError::Message(format!("failed to start worker pool: {e}")))?;

        let cancel = &self.cancel;
        let results = pool.install(|| {
            items
                .par_iter()
                .with_max_len(1)
                .map(|item| {
                    if cancel.is_cancelled() {
                        None
                    } else {
                        Some(job(item))
                    }
                })
                .collect()
        });
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{Duration, Instant};

    #[test]
    fn test_results_in_item_order() {
        let pool = WorkerPool::new(4);
        let items: Vec<u64> = (0..16).collect();
        let results = pool
            .run(&items, |i| {
                std::thread::sleep(Duration::from_millis(16 - i));
                i * 10
            })
            .unwrap();
        let values: Vec<u64> = results.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(values, items.iter().map(|i| i * 10).collect::<Vec<_>>());
    }

    #[test]
    fn test_concurrency_is_bounded() {
        let pool = WorkerPool::new(2);
        let active = AtomicUsize::new(0);
        let peak = AtomicUsize::new(0);
        let items: Vec<usize> = (0..8).collect();

        pool.run(&items, |_| {
            let now = active.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(50));
            active.fetch_sub(1, Ordering::SeqCst);
        })
        .unwrap();

        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[test]
    fn test_parallel_speedup() {
        let pool = WorkerPool::new(4);
        let items: Vec<usize> = (0..8).collect();

        let start = Instant::now();
        pool.run(&items, |_| std::thread::sleep(Duration::from_millis(200)))
            .unwrap();
        // 8 jobs of 200ms on 4 workers: two rounds, well under serial time.
        assert!(start.elapsed() < Duration::from_millis(1200));
    }

    #[test]
    fn test_cancel_stops_admission() {
        let token = CancelToken::new();
        token.cancel();
        let pool = WorkerPool::new(2).with_cancel(token);
        let items = vec![1, 2, 3];

        let results = pool.run(&items, |i| i * 2).unwrap();
        assert!(results.iter().all(Option::is_none));
    }
}
