//! Slow operations (network checks, catalog download, host restart) run on
//! named worker threads. Each sends one [`TaskEvent`] back over a channel and
//! the owner applies events one at a time.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::{Duration, Instant};

use crate::catalog::{CatalogError, CatalogStore};
use crate::restart::{self, RestartError, RestartPlan};
use crate::update::{self, UpdateError, VersionCheck};

/// Completion of one background job.
#[derive(Debug)]
pub enum TaskEvent {
    AppVersion(Result<VersionCheck, UpdateError>),
    CatalogVersion(Result<VersionCheck, UpdateError>),
    /// Bytes written on success.
    CatalogDownloaded(Result<usize, CatalogError>),
    Restarted(Result<(), RestartError>),
}

pub struct BackgroundTasks {
    tx: Sender<TaskEvent>,
    rx: Receiver<TaskEvent>,
    pending: usize,
}

impl Default for BackgroundTasks {
    fn default() -> Self {
        Self::new()
    }
}

impl BackgroundTasks {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();
        Self { tx, rx, pending: 0 }
    }

    /// Jobs started and not yet received.
    pub fn pending(&self) -> usize {
        self.pending
    }

    /// Run `job` on a new thread named `name`.
    pub fn spawn<F>(&mut self, name: &str, job: F) -> std::io::Result<()>
    where
        F: FnOnce() -> TaskEvent + Send + 'static,
    {
        let tx = self.tx.clone();
        let thread_name = format!("mcpm-{}", name);
        std::thread::Builder::new().name(thread_name.clone()).spawn(move || {
            let event = job();
            if tx.send(event).is_err() {
                log::debug!("{}: receiver gone, result dropped", thread_name);
            }
        })?;
        self.pending += 1;
        log::debug!("Started background task '{}' ({} pending)", name, self.pending);
        Ok(())
    }

    pub fn check_app_version(&mut self, url: String) -> std::io::Result<()> {
        self.spawn("app-version", move || TaskEvent::AppVersion(update::check_app_version(&url)))
    }

    pub fn check_catalog_version(&mut self, local: Option<String>, url: String) -> std::io::Result<()> {
        self.spawn("catalog-version", move || {
            TaskEvent::CatalogVersion(update::check_catalog_version(local.as_deref(), &url))
        })
    }

    pub fn download_catalog(&mut self, store: CatalogStore, url: String) -> std::io::Result<()> {
        self.spawn("catalog-download", move || {
            TaskEvent::CatalogDownloaded(store.download_latest(&url))
        })
    }

    pub fn restart(&mut self, plan: RestartPlan) -> std::io::Result<()> {
        self.spawn("restart", move || TaskEvent::Restarted(restart::execute(&plan)))
    }

    /// A finished job's event, if one is ready.
    pub fn try_next(&mut self) -> Option<TaskEvent> {
        let event = self.rx.try_recv().ok()?;
        self.pending = self.pending.saturating_sub(1);
        Some(event)
    }

    /// Wait up to `timeout` for the next event. `None` if nothing is pending or time ran out.
    pub fn wait_next(&mut self, timeout: Duration) -> Option<TaskEvent> {
        if self.pending == 0 {
            return None;
        }
        match self.rx.recv_timeout(timeout) {
            Ok(event) => {
                self.pending -= 1;
                Some(event)
            }
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Collect events until nothing is pending or `timeout` has passed overall.
    pub fn wait_all(&mut self, timeout: Duration) -> Vec<TaskEvent> {
        let deadline = Instant::now() + timeout;
        let mut events = Vec::new();
        while self.pending > 0 {
            let left = deadline.saturating_duration_since(Instant::now());
            if left.is_zero() {
                break;
            }
            match self.wait_next(left) {
                Some(event) => events.push(event),
                None => break,
            }
        }
        events
    }
}
