// backupcron/src/cron.rs
use chrono::Local;
use futures::FutureExt;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::any::Any;
use std::convert::Infallible;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use crate::context::BackupContext;
use crate::uploader::Uploader;

/// Suspends the scheduler between runs.
#[allow(async_fn_in_trait)]
pub trait Sleep {
    async fn sleep(&mut self, duration: Duration);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleep;

impl Sleep for TokioSleep {
    async fn sleep(&mut self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Runs a backup routine forever at a jittered interval.
///
/// Runs never overlap: the routine is awaited to completion before the next
/// wait starts. A failing or panicking run is logged and does not stop the loop.
pub struct Cron<R = StdRng, S = TokioSleep> {
    interval_secs: f64,
    rng: R,
    sleeper: S,
}

impl Cron {
    pub fn new(interval_secs: f64) -> Self {
        Cron {
            interval_secs,
            rng: StdRng::from_entropy(),
            sleeper: TokioSleep,
        }
    }
}

impl<R: Rng, S: Sleep> Cron<R, S> {
    pub fn with_rng<R2: Rng>(self, rng: R2) -> Cron<R2, S> {
        Cron {
            interval_secs: self.interval_secs,
            rng,
            sleeper: self.sleeper,
        }
    }

    pub fn with_sleep<S2: Sleep>(self, sleeper: S2) -> Cron<R, S2> {
        Cron {
            interval_secs: self.interval_secs,
            rng: self.rng,
            sleeper,
        }
    }

    pub fn sleeper(&self) -> &S {
        &self.sleeper
    }

    /// Interval plus a uniform offset within a tenth of the interval, centred on zero.
    pub fn next_wait(&mut self) -> Duration {
        let interval_error = self.interval_secs / 10.0;
        let offset = if interval_error > 0.0 {
            self.rng.gen_range(-interval_error / 2.0..=interval_error / 2.0)
        } else {
            0.0
        };
        Duration::try_from_secs_f64((self.interval_secs + offset).max(0.0)).unwrap_or(Duration::MAX)
    }

    /// One iteration: run the routine, then wait until the next run.
    pub async fn run_once<U, F>(&mut self, ctx: &BackupContext<U>, backup: &mut F)
    where
        U: Uploader,
        F: AsyncFnMut(&BackupContext<U>) -> anyhow::Result<()>,
    {
        log::info!(target: ctx.log_target(), "Start backup");

        match AssertUnwindSafe(backup(ctx)).catch_unwind().await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => log::error!(target: ctx.log_target(), "Failed to backup: {:?}", e),
            Err(payload) => log::error!(
                target: ctx.log_target(),
                "Backup panicked: {}",
                panic_message(payload.as_ref())
            ),
        }

        let wait = self.next_wait();
        let next_run = Local::now()
            + chrono::Duration::from_std(wait).unwrap_or_else(|_| chrono::Duration::zero());
        log::info!(
            target: ctx.log_target(),
            "Next backup at {}",
            next_run.format("%Y-%m-%d %H:%M:%S")
        );
        self.sleeper.sleep(wait).await;
    }

    pub async fn run_iterations<U, F>(&mut self, ctx: &BackupContext<U>, mut backup: F, iterations: usize)
    where
        U: Uploader,
        F: AsyncFnMut(&BackupContext<U>) -> anyhow::Result<()>,
    {
        for _ in 0..iterations {
            self.run_once(ctx, &mut backup).await;
        }
    }

    pub async fn run<U, F>(mut self, ctx: &BackupContext<U>, mut backup: F) -> Infallible
    where
        U: Uploader,
        F: AsyncFnMut(&BackupContext<U>) -> anyhow::Result<()>,
    {
        loop {
            self.run_once(ctx, &mut backup).await;
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}

/// Runs `backup` every `interval_secs` (±5%) until the process is terminated.
pub async fn cron<U, F>(ctx: &BackupContext<U>, backup: F, interval_secs: f64) -> Infallible
where
    U: Uploader,
    F: AsyncFnMut(&BackupContext<U>) -> anyhow::Result<()>,
{
    Cron::new(interval_secs).run(ctx, backup).await
}
