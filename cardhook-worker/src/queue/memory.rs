//! In-memory dispatcher for tests.

use anyhow::{bail, Result};
use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{Dispatcher, Job};

/// Dispatcher that collects jobs instead of sending them anywhere.
#[derive(Default)]
pub struct MemoryDispatcher {
    jobs: Mutex<Vec<Job>>,
    accept_limit: Mutex<Option<usize>>,
}

impl MemoryDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept only `limit` more jobs; later dispatches fail.
    pub async fn fail_after(&self, limit: usize) {
        *self.accept_limit.lock().await = Some(limit);
    }

    /// Accept every job again.
    pub async fn recover(&self) {
        *self.accept_limit.lock().await = None;
    }

    /// Jobs dispatched so far, oldest first.
    pub async fn jobs(&self) -> Vec<Job> {
        self.jobs.lock().await.clone()
    }

    /// Remove and return every dispatched job.
    pub async fn drain(&self) -> Vec<Job> {
        std::mem::take(&mut *self.jobs.lock().await)
    }
}

#[async_trait]
impl Dispatcher for MemoryDispatcher {
    async fn dispatch(&self, job: &Job) -> Result<()> {
        let mut limit = self.accept_limit.lock().await;
        match limit.as_mut() {
            Some(0) => bail!("dispatcher unavailable"),
            Some(remaining) => *remaining -= 1,
            None => {}
        }
        self.jobs.lock().await.push(job.clone());
        Ok(())
    }
}
