//! `watch` command: poll every run until Ctrl+C.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use runwatch::run::RunSnapshot;
use uuid::Uuid;

use crate::error::CliError;
use crate::runner::{CliRunner, GlobalOptions};

/// Shutdown flag poll period while waiting between rounds.
const SHUTDOWN_POLL: Duration = Duration::from_millis(100);

/// Runs whose max step differs from the last seen one, with the new step.
///
/// Updates `seen` in place. Runs seen for the first time are reported too.
fn advanced(seen: &mut HashMap<Uuid, u64>, runs: &[Arc<RunSnapshot>]) -> Vec<(Uuid, String, u64)> {
    let mut changes = Vec::new();
    for run in runs {
        let step = run.max_step();
        if seen.insert(run.run_id, step) != Some(step) {
            changes.push((run.run_id, run.descriptor.name.clone(), step));
        }
    }
    changes
}

pub fn run(options: &GlobalOptions, interval: u64) -> Result<(), CliError> {
    if interval == 0 {
        return Err(CliError::Config("--interval must be at least 1 second".to_string()));
    }

    let runner = CliRunner::new(options)?;
    runner.log_startup("watch");
    let cache = runner.orchestrator();

    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = shutdown.clone();
    ctrlc::set_handler(move || {
        shutdown_clone.store(true, Ordering::SeqCst);
    })
    .map_err(|e| CliError::Config(format!("Failed to set signal handler: {}", e)))?;

    println!(
        "Watching {} every {}s. Press Ctrl+C to stop.",
        runner.config().cache.experiments_root.display(),
        interval
    );
    println!();

    let mut seen = HashMap::new();
    runner.block_on(async {
        while !shutdown.load(Ordering::SeqCst) {
            match cache.get_all().await {
                Ok(runs) => {
                    for (run_id, name, step) in advanced(&mut seen, &runs) {
                        println!("{}  {:<24}  step {}", run_id, name, step);
                    }
                }
                Err(e) => tracing::warn!(error = %e, "Failed to read runs"),
            }

            let deadline = tokio::time::Instant::now() + Duration::from_secs(interval);
            while !shutdown.load(Ordering::SeqCst) && tokio::time::Instant::now() < deadline {
                tokio::time::sleep(SHUTDOWN_POLL).await;
            }
        }
    });

    println!();
    println!("Stopped. Cache activity:");
    println!("  {}", cache.metrics());
    println!("  index delay: {:?}", runner.block_on(cache.index_delay()));
    println!("  cached runs: {}", cache.cached_run_count());
    println!(
        "  probe hit rate: {:.0}%",
        cache.metrics().probe_hit_rate() * 100.0
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(run_id: Uuid, step: u64) -> Arc<RunSnapshot> {
        let mut values = runwatch::run::ValueMap::new();
        values.insert(
            runwatch::run::STEP_INDICATOR.to_string(),
            runwatch::run::IndicatorValue::new(step as f64, step),
        );
        Arc::new(RunSnapshot {
            run_id,
            experiment_name: "exp".to_string(),
            descriptor: Default::default(),
            size: Default::default(),
            values,
            configs: Default::default(),
            indicators: Default::default(),
        })
    }

    #[test]
    fn test_advanced_reports_new_and_changed_runs() {
        let a = Uuid::from_u128(1);
        let b = Uuid::from_u128(2);
        let mut seen = HashMap::new();

        let first = advanced(&mut seen, &[snapshot(a, 1), snapshot(b, 1)]);
        assert_eq!(first.len(), 2);

        let second = advanced(&mut seen, &[snapshot(a, 1), snapshot(b, 2)]);
        assert_eq!(second, vec![(b, String::new(), 2)]);

        assert!(advanced(&mut seen, &[snapshot(a, 1), snapshot(b, 2)]).is_empty());
    }
}
