//! Run command - start a coordinator for every configured account.
//!
//! Vehicle data comes from a simulated backend loaded from a JSON fleet
//! fixture. Status is printed periodically until Ctrl+C.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use fleetsync::api::SimulatedVehicleApi;
use fleetsync::{AccountStatus, Coordinator, Registry};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::error::CliError;
use crate::runner::CliRunner;

/// Arguments for the run command.
pub struct RunArgs {
    pub fixture: PathBuf,
    pub accounts: Vec<String>,
    pub latency_ms: u64,
    pub status_interval_secs: u64,
}

pub fn run(args: RunArgs, config_path: &Path) -> Result<(), CliError> {
    let runner = CliRunner::new(config_path)?;
    runner.log_startup("run");
    let config = runner.config();

    let selected: Vec<_> = config
        .accounts
        .iter()
        .filter(|a| args.accounts.is_empty() || args.accounts.contains(&a.name))
        .collect();
    if selected.is_empty() {
        return Err(CliError::Config(format!(
            "No accounts to run. Add an [account.<name>] section to {} \
             or check the --account names.",
            config_path.display()
        )));
    }

    let api = SimulatedVehicleApi::from_fixture_file(&args.fixture)
        .map_err(|source| CliError::Fixture {
            path: args.fixture.clone(),
            source,
        })?
        .with_latency(Duration::from_millis(args.latency_ms));
    let api = Arc::new(api);

    println!("fleetsync v{}", fleetsync::VERSION);
    println!("==============");
    println!();
    println!("Fixture:  {}", args.fixture.display());
    println!("Accounts: {}", selected.len());
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    ctrlc::set_handler(move || {
        println!();
        println!("Received shutdown signal, stopping coordinators...");
        signal.cancel();
    })
    .map_err(|e| CliError::Config(format!("Failed to set signal handler: {}", e)))?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(CliError::Runtime)?;

    runtime.block_on(async {
        let registry = Registry::new();
        for settings in &selected {
            let coordinator = Coordinator::new(
                &settings.account(),
                api.clone(),
                config.coordinator_config(settings),
            );
            info!(name = %settings.name, account = %settings.account_id(), "Starting account");
            registry.register(coordinator).await;
        }

        let mut ticker = tokio::time::interval(Duration::from_secs(args.status_interval_secs.max(1)));
        ticker.tick().await;
        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    for status in registry.statuses() {
                        println!("{}", status_line(&status));
                    }
                }
            }
        }

        let statuses = registry.statuses();
        registry.shutdown_all().await;

        println!();
        println!("Session Summary");
        println!("───────────────");
        for status in &statuses {
            println!(
                "  {}: {} refreshes, {} skipped ticks",
                status.label, status.refreshes_completed, status.ticks_skipped
            );
        }
    });

    Ok(())
}

fn status_line(status: &AccountStatus) -> String {
    let updated = status
        .last_updated
        .map(|t| t.format("%H:%M:%S").to_string())
        .unwrap_or_else(|| "never".to_string());
    let mut line = format!(
        "[{}] {} | {} vehicle(s) | updated {} | {} refreshes | {} pending action(s)",
        status.label,
        status.loop_state,
        status.vehicles,
        updated,
        status.refreshes_completed,
        status.pending_actions
    );
    if status.needs_reconfiguration {
        line.push_str(" | NEEDS RECONFIGURATION");
    } else if let Some(error) = &status.last_error {
        line.push_str(&format!(" | last error: {}", error));
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetsync::model::AccountId;
    use fleetsync::LoopState;

    #[test]
    fn test_status_line_flags_reconfiguration() {
        let status = AccountStatus {
            account_id: AccountId::from_raw("abc"),
            label: "kia/europe me@example.com".to_string(),
            loop_state: LoopState::Idle,
            last_updated: None,
            last_error: Some("bad password".to_string()),
            needs_reconfiguration: true,
            refreshes_completed: 0,
            ticks_skipped: 2,
            pending_actions: 0,
            vehicles: 0,
        };
        let line = status_line(&status);
        assert!(line.starts_with("[kia/europe me@example.com] idle"));
        assert!(line.ends_with("NEEDS RECONFIGURATION"));
    }
}
