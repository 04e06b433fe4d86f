use capture::{ReaderStatus, StreamReader};
use common::Shutdown;
use detection::{Detector, Dispatcher};
use std::io;
use std::sync::Arc;
use std::thread::JoinHandle;

/// Owns every worker thread of the process and the flag that stops them.
pub struct Supervisor {
    shutdown: Shutdown,
    workers: Vec<(String, JoinHandle<()>)>,
}

impl Supervisor {
    pub fn new(shutdown: Shutdown) -> Self {
        Self {
            shutdown,
            workers: Vec::new(),
        }
    }

    pub fn shutdown(&self) -> &Shutdown {
        &self.shutdown
    }

    pub fn worker_names(&self) -> impl Iterator<Item = &str> {
        self.workers.iter().map(|(name, _)| name.as_str())
    }

    /// Start `reader` on its own thread and hand back its live status.
    pub fn spawn_reader(&mut self, reader: StreamReader) -> io::Result<Arc<ReaderStatus>> {
        let name = format!("reader-{}", reader.name());
        let status = reader.status();
        let handle = reader.spawn(self.shutdown.clone())?;
        tracing::info!(worker = %name, "Worker started");
        self.workers.push((name, handle));
        Ok(status)
    }

    pub fn spawn_dispatcher<D: Detector + 'static>(
        &mut self,
        dispatcher: Dispatcher<D>,
    ) -> io::Result<()> {
        let handle = dispatcher.spawn(self.shutdown.clone())?;
        tracing::info!(worker = "dispatcher", "Worker started");
        self.workers.push(("dispatcher".to_string(), handle));
        Ok(())
    }

    /// Raise the shutdown flag and wait for every worker to exit.
    pub fn shutdown_and_join(self) {
        self.shutdown.trigger();
        tracing::info!(workers = self.workers.len(), "Stopping workers");

        for (name, handle) in self.workers {
            match handle.join() {
                Ok(()) => tracing::debug!(worker = %name, "Worker stopped"),
                Err(_) => tracing::error!(worker = %name, "Worker panicked"),
            }
        }
    }
}
