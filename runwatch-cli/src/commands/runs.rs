//! `runs` and `show` commands.

use std::sync::Arc;

use runwatch::run::{sort_by_trial_desc, RunSnapshot, STEP_INDICATOR};
use uuid::Uuid;

use super::format_size;
use crate::error::CliError;
use crate::runner::{CliRunner, GlobalOptions};

/// List runs, newest first.
pub fn run_list(options: &GlobalOptions, experiment: Option<&str>, json: bool) -> Result<(), CliError> {
    let runner = CliRunner::new(options)?;
    runner.log_startup("runs");
    let cache = runner.orchestrator();

    let mut runs = runner.block_on(async {
        match experiment {
            Some(name) => cache.get_experiment(name).await,
            None => cache.get_all().await,
        }
    })?;
    sort_by_trial_desc(&mut runs);

    if json {
        let plain: Vec<&RunSnapshot> = runs.iter().map(Arc::as_ref).collect();
        println!("{}", serde_json::to_string_pretty(&plain)?);
        return Ok(());
    }

    if runs.is_empty() {
        println!("No runs found in {}", runner.config().cache.experiments_root.display());
        return Ok(());
    }

    println!("{}", table_header());
    for run in &runs {
        println!("{}", table_row(run));
    }
    Ok(())
}

/// Print one run in detail.
pub fn run_show(options: &GlobalOptions, run_id: Uuid, json: bool) -> Result<(), CliError> {
    let runner = CliRunner::new(options)?;
    runner.log_startup("show");
    let cache = runner.orchestrator();

    let run = runner.block_on(cache.get_run(run_id))?;

    if json {
        println!("{}", serde_json::to_string_pretty(run.as_ref())?);
    } else {
        print_details(&run);
    }
    Ok(())
}

fn table_header() -> String {
    format!(
        "{:<36}  {:<16}  {:<24}  {:>8}  {:<19}  {:>10}",
        "RUN", "EXPERIMENT", "NAME", "STEP", "STARTED", "SIZE"
    )
}

fn table_row(run: &RunSnapshot) -> String {
    let started = run
        .trial_started_at()
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "-".to_string());

    format!(
        "{:<36}  {:<16}  {:<24}  {:>8}  {:<19}  {:>10}",
        run.run_id,
        truncate(&run.experiment_name, 16),
        truncate(&run.descriptor.name, 24),
        run.max_step(),
        started,
        format_size(run.size.total)
    )
}

fn truncate(s: &str, width: usize) -> String {
    if s.chars().count() <= width {
        s.to_string()
    } else {
        let mut out: String = s.chars().take(width.saturating_sub(1)).collect();
        out.push('~');
        out
    }
}

fn print_details(run: &RunSnapshot) {
    let d = &run.descriptor;
    println!("Run {}", run.run_id);
    println!("  Experiment: {}", run.experiment_name);
    println!("  Name:       {}", d.name);
    if !d.comment.is_empty() {
        println!("  Comment:    {}", d.comment);
    }
    if !d.tags.is_empty() {
        println!("  Tags:       {}", d.tags.join(", "));
    }
    if !d.commit.is_empty() {
        let dirty = if d.is_dirty { " (dirty)" } else { "" };
        println!("  Commit:     {}{} {}", d.commit, dirty, d.commit_message);
    }
    if let Some(started) = run.trial_started_at() {
        println!("  Started:    {}", started);
    }
    println!("  Step:       {}", run.max_step());
    println!();

    println!("Disk usage");
    println!("  Total:       {}", format_size(run.size.total));
    println!("  Artifacts:   {}", format_size(run.size.artifacts));
    println!("  Checkpoints: {}", format_size(run.size.checkpoints));
    println!("  TensorBoard: {}", format_size(run.size.tensorboard));
    println!("  SQLite:      {}", format_size(run.size.sqlite));
    println!("  Analytics:   {}", format_size(run.size.analytics));

    let indicators: Vec<_> = run
        .values
        .iter()
        .filter(|(name, _)| name.as_str() != STEP_INDICATOR)
        .collect();
    if !indicators.is_empty() {
        println!();
        println!("Indicators");
        for (name, value) in indicators {
            println!("  {:<24} {:>14.6}  @ {}", name, value.value, value.step);
        }
    }

    if !run.configs.is_empty() {
        println!();
        println!("Configs");
        let mut configs: Vec<_> = run.configs.values().collect();
        configs.sort_by_key(|c| c.order);
        for config in configs {
            let value = if config.value.is_null() {
                &config.computed
            } else {
                &config.value
            };
            println!("  {:<24} {}", config.name, value);
        }
    }
}
