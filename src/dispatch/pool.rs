// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Bounded worker pool.
//!
//! Per-repository work is blocking: Git subprocesses, network transfers, and
//! directory walks. Each job therefore runs on Tokio's blocking thread pool,
//! while a semaphore caps how many of them may run at the same time. A job
//! only starts after it holds a permit, so at most `size` jobs are ever in
//! flight.
//!
//! The pool never cancels a job that already started. An [`Interrupt`] only
//! stops the pool from starting more of them; jobs that never started are
//! handed back to the caller.

use futures::{stream::FuturesUnordered, StreamExt};
use std::{
    num::NonZeroUsize,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
    thread::available_parallelism,
};
use tokio::{sync::Semaphore, task::spawn_blocking};
use tracing::{debug, warn};

/// Shared flag asking a fleet call to stop starting new tasks.
#[derive(Debug, Clone, Default)]
pub struct Interrupt {
    flag: Arc<AtomicBool>,
}

impl Interrupt {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_triggered(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Fixed-size pool of blocking workers.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    size: usize,
    permits: Arc<Semaphore>,
    gauge: Arc<Gauge>,
}

impl WorkerPool {
    /// Construct pool running at most `size` jobs at once.
    ///
    /// A size of zero is treated as one.
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            size,
            permits: Arc::new(Semaphore::new(size)),
            gauge: Arc::new(Gauge::default()),
        }
    }

    /// Construct pool sized to the host's available parallelism.
    ///
    /// Falls back to a single worker if parallelism cannot be determined.
    pub fn with_available_parallelism() -> Self {
        let size = available_parallelism().map(NonZeroUsize::get).unwrap_or(1);
        debug!("worker pool size {size}");
        Self::new(size)
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Highest number of jobs ever observed running at once.
    pub fn peak(&self) -> usize {
        self.gauge.peak.load(Ordering::SeqCst)
    }

    /// Run `work` once per job, and wait for every started job to finish.
    ///
    /// Returns jobs that were never started because of an interrupt. A job
    /// that panics is logged and otherwise ignored; its side effects, or lack
    /// thereof, are for the caller to notice.
    pub async fn run<T, F>(&self, jobs: Vec<T>, interrupt: &Interrupt, work: F) -> Vec<T>
    where
        T: Send + 'static,
        F: Fn(T) + Send + Sync + 'static,
    {
        let work = Arc::new(work);
        let mut running = FuturesUnordered::new();
        let mut abandoned = Vec::new();

        for job in jobs {
            let Ok(permit) = Arc::clone(&self.permits).acquire_owned().await else {
                abandoned.push(job);
                continue;
            };

            // INVARIANT: Never start a job once interrupted.
            if interrupt.is_triggered() {
                abandoned.push(job);
                continue;
            }

            let work = Arc::clone(&work);
            let gauge = Arc::clone(&self.gauge);
            running.push(spawn_blocking(move || {
                let _permit = permit;
                let _active = gauge.enter();
                work(job);
            }));
        }

        while let Some(joined) = running.next().await {
            if let Err(err) = joined {
                warn!("worker stopped abnormally: {err}");
            }
        }

        if !abandoned.is_empty() {
            debug!("{} jobs never started", abandoned.len());
        }

        abandoned
    }
}

#[derive(Debug, Default)]
struct Gauge {
    running: AtomicUsize,
    peak: AtomicUsize,
}

impl Gauge {
    fn enter(&self) -> Active<'_> {
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        Active { gauge: self }
    }
}

// Leaves the gauge on drop, so panicking jobs are counted out too.
struct Active<'a> {
    gauge: &'a Gauge,
}

impl Drop for Active<'_> {
    fn drop(&mut self) {
        self.gauge.running.fetch_sub(1, Ordering::SeqCst);
    }
}
