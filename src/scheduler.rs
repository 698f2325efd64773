//! Fixed interval loop around [`Reporter::run_cycle`].
use crate::reporter::Reporter;
use tokio_util::sync::CancellationToken;

/// Runs a cycle right away and then once per configured interval until
/// `cancel` fires.
///
/// A cycle that is already running finishes, cancellation only stops the
/// next one from starting. Failures are logged and the loop carries on.
/// Returns the number of cycles started.
pub async fn run(reporter: &Reporter, cancel: CancellationToken) -> usize {
    let interval = reporter.settings().interval;
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    let mut cycles = 0;
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        cycles += 1;
        match reporter.run_cycle().await {
            Ok(summary) => tracing::info!(
                cycle = cycles,
                ts = summary.ts,
                total = summary.total,
                first_run = summary.first_run,
                messages = summary.messages,
                "posted update"
            ),
            Err(e) => tracing::error!(
                cycle = cycles,
                kind = e.kind(),
                "report cycle failed: {}",
                e
            ),
        }
    }

    tracing::info!(cycles, "scheduler stopped");
    cycles
}
