use crate::*;
use log::debug;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::sync_channel;
use std::sync::{Arc, Mutex};
use std::thread;

/// Number of items buffered between the producer and the workers, per worker
const QUEUE_DEPTH: usize = 4;

/// Shared cancellation flag, checked between items
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Run `work` over `items` on `nthreads` workers.
///
/// One producer thread feeds a bounded queue; results are handed to `sink` on the calling
/// thread, one at a time, in completion order. A sink error cancels the pool and is
/// returned. Returns the number of results delivered to the sink.
pub fn run_pool<I, T, R, W, S>(
    items: I,
    nthreads: usize,
    cancel: &CancelToken,
    work: W,
    mut sink: S,
) -> Result<usize, Error>
where
    I: IntoIterator<Item = T>,
    I::IntoIter: Send,
    T: Send,
    R: Send,
    W: Fn(T) -> R + Sync,
    S: FnMut(R) -> Result<(), Error>,
{
    let nthreads = nthreads.max(1);
    let items = items.into_iter();
    let (item_tx, item_rx) = sync_channel::<T>(nthreads * QUEUE_DEPTH);
    let (result_tx, result_rx) = sync_channel::<R>(nthreads * QUEUE_DEPTH);
    let item_rx = Mutex::new(item_rx);
    let work = &work;
    let item_rx = &item_rx;

    thread::scope(|scope| {
        let producer_cancel = cancel.clone();
        scope.spawn(move || {
            for item in items {
                if producer_cancel.is_cancelled() || item_tx.send(item).is_err() {
                    break;
                }
            }
        });

        for _ in 0..nthreads {
            let result_tx = result_tx.clone();
            let cancel = cancel.clone();
            scope.spawn(move || loop {
                let next = match item_rx.lock() {
                    Ok(rx) => rx.recv(),
                    Err(_) => break,
                };
                let item = match next {
                    Ok(item) => item,
                    Err(_) => break,
                };
                // once cancelled, keep draining so the producer is never left blocked
                if cancel.is_cancelled() {
                    continue;
                }
                if result_tx.send(work(item)).is_err() {
                    break;
                }
            });
        }
        drop(result_tx);

        let mut count = 0;
        let mut outcome = Ok(());
        for result in result_rx.iter() {
            if outcome.is_err() {
                // drain so blocked workers can finish
                continue;
            }
            if let Err(e) = sink(result) {
                cancel.cancel();
                outcome = Err(e);
                continue;
            }
            count += 1;
        }
        debug!("worker pool finished after {} results", count);

        outcome?;
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        Ok(count)
    })
}

/// Worker count from an explicit value, then `EG_NTHREADS`, then the number of CPUs
pub fn default_nthreads(explicit: Option<usize>) -> usize {
    explicit
        .or_else(|| {
            std::env::var("EG_NTHREADS")
                .ok()
                .and_then(|v| v.parse().ok())
        })
        .or_else(|| thread::available_parallelism().ok().map(|n| n.get()))
        .unwrap_or(1)
        .max(1)
}
