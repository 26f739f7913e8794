use anyhow::Result;
use tokio::sync::watch;
use tokio::time::{interval, sleep, Duration};

use crate::core::shutdown::{shutdown_signal, Shutdown};
use crate::core::state::AppState;
use crate::tasks::finalize;

const STALE_SWEEP_SECONDS: u64 = 60;

pub(crate) async fn run(state: AppState) -> Result<()> {
    let shutdown = Shutdown::new();
    let concurrency = state.settings().finalize().worker_concurrency.max(1);

    let mut handles = Vec::with_capacity(concurrency + 1);
    for _ in 0..concurrency {
        handles.push(tokio::spawn(finalize_worker(state.clone(), shutdown.subscribe())));
    }
    handles.push(tokio::spawn(requeue_stale_loop(state.clone(), shutdown.subscribe())));

    tracing::info!(workers = concurrency, "Finalize workers started");

    shutdown_signal().await;
    let listening = shutdown.trigger();
    tracing::info!(listening, "Stopping finalize workers");

    for handle in handles {
        if let Err(err) = handle.await {
            tracing::error!(error = %err, "Background task join failed");
        }
    }

    Ok(())
}

async fn finalize_worker(state: AppState, mut shutdown: watch::Receiver<bool>) {
    let poll = Duration::from_secs(state.settings().finalize().poll_interval_seconds.max(1));

    loop {
        if *shutdown.borrow() {
            break;
        }

        match finalize::claim_next_job(state.db()).await {
            Ok(Some(job)) => {
                if let Err(err) = finalize::process_job(&state, &job).await {
                    tracing::error!(
                        job_id = %job.id,
                        exam_id = %job.exam_id,
                        error = %err,
                        "Failed to record finalize job result"
                    );
                }
                continue;
            }
            Ok(None) => {}
            Err(err) => tracing::error!(error = %err, "Failed to claim finalize job"),
        }

        tokio::select! {
            _ = shutdown.changed() => break,
            _ = sleep(poll) => {}
        }
    }
}

async fn requeue_stale_loop(state: AppState, mut shutdown: watch::Receiver<bool>) {
    let mut tick = interval(Duration::from_secs(STALE_SWEEP_SECONDS));
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = tick.tick() => {
                if let Err(err) = finalize::requeue_stale_jobs(&state).await {
                    tracing::error!(error = %err, "requeue_stale_jobs failed");
                }
            }
        }
    }
}
