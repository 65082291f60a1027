use std::{panic::AssertUnwindSafe, time::Duration};

use async_trait::async_trait;
use futures::FutureExt;
use tokio::{sync::watch, task::JoinHandle, time};
use tracing::{error, info};

use crate::error::CycleError;

/// One iteration of a polling loop. Errors end the iteration, never the loop.
#[async_trait]
pub trait Cycle: Send {
    async fn run(&mut self) -> Result<(), CycleError>;
}

/// Fires once the chat connection is ready.
pub struct ReadySignal(watch::Sender<bool>);

/// Waits for [`ReadySignal::fire`]. Cheap to clone, one per loop.
#[derive(Clone)]
pub struct Readiness(watch::Receiver<bool>);

pub fn readiness() -> (ReadySignal, Readiness) {
    let (tx, rx) = watch::channel(false);
    (ReadySignal(tx), Readiness(rx))
}

impl ReadySignal {
    /// Later calls are no-ops.
    pub fn fire(&self) {
        self.0.send_replace(true);
    }
}

impl Readiness {
    /// Returns `false` if the signal was dropped without firing.
    pub async fn wait(&mut self) -> bool {
        self.0.wait_for(|ready| *ready).await.is_ok()
    }
}

/// Waits for `ready`, then runs `cycle` forever with a fixed `period` sleep
/// between iterations. Failed and panicking iterations are logged and the
/// loop carries on.
pub async fn run_loop<C: Cycle>(
    name: &'static str,
    period: Duration,
    mut ready: Readiness,
    mut cycle: C,
) {
    if !ready.wait().await {
        error!(task = name, "Connection closed before ready, loop not started");
        return;
    }
    info!(task = name, period_secs = period.as_secs(), "Loop started");

    loop {
        match AssertUnwindSafe(cycle.run()).catch_unwind().await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => e.log(name),
            Err(_) => error!(task = name, "Cycle panicked"),
        }

        time::sleep(period).await;
    }
}

/// Spawns [`run_loop`] on the runtime.
pub fn spawn_loop<C: Cycle + 'static>(
    name: &'static str,
    period: Duration,
    ready: Readiness,
    cycle: C,
) -> JoinHandle<()> {
    tokio::spawn(run_loop(name, period, ready, cycle))
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    use super::*;

    struct Counting {
        runs: Arc<AtomicUsize>,
        behaviour: fn(usize) -> Result<(), CycleError>,
    }

    #[async_trait]
    impl Cycle for Counting {
        async fn run(&mut self) -> Result<(), CycleError> {
            let n = self.runs.fetch_add(1, Ordering::SeqCst);
            (self.behaviour)(n)
        }
    }

    fn counting(behaviour: fn(usize) -> Result<(), CycleError>) -> (Counting, Arc<AtomicUsize>) {
        let runs = Arc::new(AtomicUsize::new(0));
        (
            Counting {
                runs: runs.clone(),
                behaviour,
            },
            runs,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn waits_for_readiness() {
        let (signal, ready) = readiness();
        let (cycle, runs) = counting(|_| Ok(()));
        let handle = spawn_loop("test", Duration::from_secs(600), ready, cycle);

        time::sleep(Duration::from_secs(3600)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 0);

        signal.fire();
        time::sleep(Duration::from_secs(1)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn runs_at_fixed_period() {
        let (signal, ready) = readiness();
        signal.fire();
        let (cycle, runs) = counting(|_| Ok(()));
        let handle = spawn_loop("test", Duration::from_secs(600), ready, cycle);

        time::sleep(Duration::from_secs(1)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        time::sleep(Duration::from_secs(600)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 2);
        time::sleep(Duration::from_secs(1200)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 4);

        handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn survives_errors_and_panics() {
        let (signal, ready) = readiness();
        signal.fire();
        let (cycle, runs) = counting(|n| match n {
            0 => Err(CycleError::TargetMissing("channel".to_owned())),
            1 => panic!("bad cycle"),
            _ => Ok(()),
        });
        let handle = spawn_loop("test", Duration::from_secs(10), ready, cycle);

        time::sleep(Duration::from_secs(35)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 4);
        assert!(!handle.is_finished());

        handle.abort();
    }

    #[tokio::test]
    async fn dropped_signal_never_starts() {
        let (signal, ready) = readiness();
        let (cycle, runs) = counting(|_| Ok(()));
        drop(signal);

        run_loop("test", Duration::from_secs(1), ready, cycle).await;
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }
}
