//! Ordered execution of work items under a bounded concurrency ceiling.
//!
//! Items are dispatched onto the rayon pool, at most `concurrency` in
//! flight, each with its own result channel. The consumer-facing iterator
//! drains those channels in submission order, so the output sequence always
//! matches the declared item order no matter which item finishes first.
//!
//! Dispatch is pull-driven: a new item is only submitted when the consumer
//! advances and a slot frees up, so a slow consumer throttles the pipeline
//! and memory stays bounded at roughly `concurrency` buffered results.
//!
//! A failing handler surfaces its error at the item's position in the
//! sequence and ends it; siblings already dispatched still run to
//! completion (their results are simply dropped). There is no cancellation.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver};

/// Concurrency ceiling used when none is configured.
pub fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Run `handler` over `items` with at most `concurrency` in flight,
/// yielding flattened outputs in item order.
///
/// Each item may produce zero outputs (nothing is emitted for it) or
/// several (emitted contiguously).
pub fn execute_ordered<I, T, E, F>(
    items: Vec<I>,
    concurrency: usize,
    handler: F,
) -> OrderedResults<I, T, E, F>
where
    I: Send + 'static,
    T: Send + 'static,
    E: Send + 'static,
    F: Fn(I) -> Result<Vec<T>, E> + Send + Sync + 'static,
{
    let mut results = OrderedResults {
        pending: items.into_iter().collect(),
        handler: Arc::new(handler),
        in_flight: VecDeque::new(),
        current: Vec::new().into_iter(),
        concurrency: concurrency.max(1),
        done: false,
    };
    results.fill_slots();
    results
}

/// Iterator over ordered execution results. See [`execute_ordered`].
pub struct OrderedResults<I, T, E, F> {
    pending: VecDeque<I>,
    handler: Arc<F>,
    in_flight: VecDeque<Receiver<Result<Vec<T>, E>>>,
    current: std::vec::IntoIter<T>,
    concurrency: usize,
    done: bool,
}

impl<I, T, E, F> OrderedResults<I, T, E, F>
where
    I: Send + 'static,
    T: Send + 'static,
    E: Send + 'static,
    F: Fn(I) -> Result<Vec<T>, E> + Send + Sync + 'static,
{
    fn fill_slots(&mut self) {
        while self.in_flight.len() < self.concurrency {
            let Some(item) = self.pending.pop_front() else {
                break;
            };
            let (tx, rx) = mpsc::channel();
            let handler = Arc::clone(&self.handler);
            rayon::spawn(move || {
                // The consumer may have stopped listening; that just drops
                // this item's result.
                let _ = tx.send(handler(item));
            });
            self.in_flight.push_back(rx);
        }
    }
}

impl<I, T, E, F> Iterator for OrderedResults<I, T, E, F>
where
    I: Send + 'static,
    T: Send + 'static,
    E: Send + 'static,
    F: Fn(I) -> Result<Vec<T>, E> + Send + Sync + 'static,
{
    type Item = Result<T, E>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        loop {
            if let Some(output) = self.current.next() {
                return Some(Ok(output));
            }

            self.fill_slots();
            let front = self.in_flight.pop_front()?;
            match front.recv() {
                Ok(Ok(outputs)) => {
                    self.current = outputs.into_iter();
                }
                Ok(Err(error)) => {
                    self.done = true;
                    return Some(Err(error));
                }
                // Worker dropped its sender without a result (panicked
                // handler): end the sequence.
                Err(_) => {
                    self.done = true;
                    return None;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn outputs_follow_declaration_order_despite_varied_latency() {
        // Later items sleep less, so completion order is roughly reversed.
        let items: Vec<usize> = (0..8).collect();
        let results: Vec<usize> = execute_ordered(items, 4, |i: usize| {
            std::thread::sleep(Duration::from_millis(((8 - i) * 7) as u64));
            Ok::<_, ()>(vec![i])
        })
        .map(|r| r.unwrap())
        .collect();

        assert_eq!(results, (0..8).collect::<Vec<_>>());
    }

    #[test]
    fn concurrency_ceiling_is_respected() {
        static IN_FLIGHT: AtomicUsize = AtomicUsize::new(0);
        static MAX_SEEN: AtomicUsize = AtomicUsize::new(0);

        let items: Vec<usize> = (0..16).collect();
        let results: Vec<usize> = execute_ordered(items, 3, |i: usize| {
            let now = IN_FLIGHT.fetch_add(1, Ordering::SeqCst) + 1;
            MAX_SEEN.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(10));
            IN_FLIGHT.fetch_sub(1, Ordering::SeqCst);
            Ok::<_, ()>(vec![i])
        })
        .map(|r| r.unwrap())
        .collect();

        assert_eq!(results.len(), 16);
        assert!(MAX_SEEN.load(Ordering::SeqCst) <= 3);
    }

    #[test]
    fn items_may_yield_zero_or_many_outputs() {
        let items: Vec<usize> = vec![0, 1, 2, 3];
        let results: Vec<usize> = execute_ordered(items, 2, |i: usize| {
            Ok::<_, ()>(match i {
                1 => vec![],
                2 => vec![20, 21],
                other => vec![other * 10],
            })
        })
        .map(|r| r.unwrap())
        .collect();

        assert_eq!(results, vec![0, 20, 21, 30]);
    }

    #[test]
    fn error_surfaces_at_its_position_and_ends_the_sequence() {
        let items: Vec<usize> = (0..6).collect();
        let results: Vec<Result<usize, String>> = execute_ordered(items, 2, |i: usize| {
            if i == 2 {
                Err(format!("item {i} failed"))
            } else {
                Ok(vec![i])
            }
        })
        .collect();

        assert_eq!(results.len(), 3);
        assert_eq!(results[0], Ok(0));
        assert_eq!(results[1], Ok(1));
        assert_eq!(results[2], Err("item 2 failed".to_string()));
    }

    #[test]
    fn dispatch_is_pull_driven() {
        static STARTED: AtomicUsize = AtomicUsize::new(0);

        let items: Vec<usize> = (0..10).collect();
        let mut results = execute_ordered(items, 2, |i: usize| {
            STARTED.fetch_add(1, Ordering::SeqCst);
            Ok::<_, ()>(vec![i])
        });

        // Only the initial window is dispatched before anyone consumes.
        std::thread::sleep(Duration::from_millis(50));
        assert!(STARTED.load(Ordering::SeqCst) <= 2);

        let first = results.next().unwrap().unwrap();
        assert_eq!(first, 0);
        let rest: Vec<usize> = results.map(|r| r.unwrap()).collect();
        assert_eq!(rest, (1..10).collect::<Vec<_>>());
        assert_eq!(STARTED.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn sequential_execution_with_concurrency_one() {
        let items: Vec<usize> = (0..5).collect();
        let results: Vec<usize> = execute_ordered(items, 1, |i: usize| Ok::<_, ()>(vec![i]))
            .map(|r| r.unwrap())
            .collect();
        assert_eq!(results, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn default_concurrency_is_at_least_one() {
        assert!(default_concurrency() >= 1);
    }
}
