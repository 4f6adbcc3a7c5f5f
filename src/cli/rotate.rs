//! `rotate` command.

use console::style;

use crate::config::Settings;
use crate::error::RotationError;
use crate::privacy::{IdentityRotator, TorController};

pub async fn cmd_rotate(settings: &Settings) -> anyhow::Result<()> {
    let controller = TorController::from_config(&settings.tor).ok_or(RotationError::NotConfigured)?;

    let outcome = controller.rotate_identity().await;
    if outcome.success {
        println!("{} {}", style("✓").green(), outcome.message);
        Ok(())
    } else {
        println!("{} {}", style("✗").red(), outcome.message);
        std::process::exit(1);
    }
}
