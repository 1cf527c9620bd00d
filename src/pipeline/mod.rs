use anyhow::{Context, Result, anyhow};
use crossbeam_channel::bounded;
use tracing::info;

use crate::elements::Batch;
use crate::router::PackCsvBlocks;
use crate::writer::BlockSink;

/// Batches queued per worker before dispatch blocks.
const QUEUE_DEPTH: usize = 16;

/// One shard's router and sink, driven by a single thread.
pub struct Worker {
    router: PackCsvBlocks,
    sink: Box<dyn BlockSink>,
}

impl Worker {
    pub fn new(router: PackCsvBlocks, sink: Box<dyn BlockSink>) -> Self {
        Self { router, sink }
    }

    /// `None` is end of stream and flushes the sink.
    pub fn handle(&mut self, batch: Option<&Batch>) -> crate::error::Result<()> {
        match self.router.call(batch)? {
            Some(block) => self.sink.call(block),
            None => self.sink.finish(),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RunStats {
    pub batches: u64,
    pub features: u64,
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

/// Deals batches round-robin to `workers` threads. Each thread builds its
/// own [`Worker`] through `factory`, so connections are never shared.
pub fn run_workers<I, F>(batches: I, workers: usize, factory: F) -> Result<RunStats>
where
    I: IntoIterator<Item = Batch>,
    F: Fn(usize) -> Result<Worker> + Sync,
{
    let workers = workers.max(1);
    let factory = &factory;

    std::thread::scope(|scope| {
        let mut senders = Vec::with_capacity(workers);
        let mut handles = Vec::with_capacity(workers);
        for index in 0..workers {
            let (tx, rx) = bounded::<Batch>(QUEUE_DEPTH);
            senders.push(tx);
            handles.push(scope.spawn(move || -> Result<u64> {
                let mut worker =
                    factory(index).with_context(|| format!("Pipeline: worker {index} setup"))?;
                info!(worker = index, "worker started");
                let mut handled = 0u64;
                for batch in rx {
                    worker.handle(Some(&batch)).with_context(|| {
                        format!("Pipeline: worker {index} failed on tile {}", batch.quadtree)
                    })?;
                    handled += 1;
                }
                worker
                    .handle(None)
                    .with_context(|| format!("Pipeline: worker {index} failed to finish"))?;
                info!(worker = index, batches = handled, "worker done");
                Ok(handled)
            }));
        }

        let mut stats = RunStats::default();
        let mut dispatch_result = Ok(());
        for (i, batch) in batches.into_iter().enumerate() {
            let target = i % workers;
            stats.batches += 1;
            stats.features += batch.len() as u64;
            if let Err(err) = senders[target].send(batch) {
                dispatch_result = Err(anyhow!(
                    "Pipeline: Failed to send batch to worker {target}: {err}"
                ));
                break;
            }
        }
        drop(senders);

        // A failed worker holds the root cause of any dispatch error.
        let mut worker_error = None;
        for (index, handle) in handles.into_iter().enumerate() {
            let err = match handle.join() {
                Ok(Ok(_)) => continue,
                Ok(Err(err)) => err,
                Err(payload) => anyhow!(
                    "Pipeline: worker {index} panicked: {}",
                    panic_message(payload.as_ref())
                ),
            };
            if worker_error.is_none() {
                worker_error = Some(err);
            }
        }

        if let Some(err) = worker_error {
            return if dispatch_result.is_err() {
                Err(err.context("Pipeline: worker failed (caused channel disconnect)"))
            } else {
                Err(err)
            };
        }
        dispatch_result?;
        Ok(stats)
    })
}
