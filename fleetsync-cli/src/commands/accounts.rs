//! `accounts` command: list configured accounts and their effective policy.

use std::path::Path;

use super::common::{format_duration, load_config};
use crate::error::CliError;

pub fn run(config_path: &Path) -> Result<(), CliError> {
    let config = load_config(config_path)?;

    if config.accounts.is_empty() {
        println!("No accounts configured.");
        println!(
            "Add an [account.<name>] section to {}",
            config_path.display()
        );
        return Ok(());
    }

    println!("Accounts");
    println!("========");

    for account in &config.accounts {
        let policy = config.policy_for(account);
        let quiet = policy
            .quiet_hours
            .map(|qh| qh.to_string())
            .unwrap_or_else(|| "off".to_string());

        println!();
        println!("{}", account.name);
        println!("  Id:          {}", account.account_id());
        println!("  Brand:       {}", account.brand);
        println!("  Region:      {}", account.region);
        println!("  Username:    {}", account.username);
        println!("  Cached:      every {}", format_duration(policy.cached_interval));
        println!("  Forced:      every {}", format_duration(policy.force_interval));
        println!("  Quiet hours: {}", quiet);
    }

    Ok(())
}
