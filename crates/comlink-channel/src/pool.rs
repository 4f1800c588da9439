use std::thread::JoinHandle;

use tracing::error;

use crate::error::{ChannelError, Result};

struct Worker {
    name: &'static str,
    handle: JoinHandle<()>,
}

/// Named worker threads owned by one channel.
///
/// Workers are joined by name so teardown can follow the required order:
/// dispatcher first, then io pump, then encoder and decoder.
#[derive(Default)]
pub(crate) struct WorkerPool {
    workers: Vec<Worker>,
}

impl WorkerPool {
    pub(crate) fn spawn(
        &mut self,
        name: &'static str,
        f: impl FnOnce() + Send + 'static,
    ) -> Result<()> {
        let handle = std::thread::Builder::new()
            .name(format!("comlink-{name}"))
            .spawn(f)
            .map_err(|source| ChannelError::Spawn { name, source })?;
        self.workers.push(Worker { name, handle });
        Ok(())
    }

    pub(crate) fn join(&mut self, name: &'static str) {
        if let Some(pos) = self.workers.iter().position(|worker| worker.name == name) {
            let worker = self.workers.remove(pos);
            if worker.handle.join().is_err() {
                error!(worker = name, "worker panicked");
            }
        }
    }

    pub(crate) fn join_all(&mut self) {
        while let Some(worker) = self.workers.pop() {
            if worker.handle.join().is_err() {
                error!(worker = worker.name, "worker panicked");
            }
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }
}
