//! One-time code maintenance.
//!
//! ```bash
//! sp-cli otp sweep
//! ```

use std::sync::Arc;
use std::time::Duration;

use smart_print_api::db::PgOtpLedger;
use smart_print_api::services::clock::SystemClock;
use smart_print_api::services::sweep::OtpSweeper;

use super::{CommandError, connect};

/// Delete every expired code once.
///
/// # Errors
///
/// Returns an error if the database is unreachable or the delete fails.
pub async fn sweep() -> Result<u64, CommandError> {
    let pool = connect().await?;

    // The interval is unused for a single pass.
    let sweeper = OtpSweeper::new(
        Arc::new(PgOtpLedger::new(pool)),
        Arc::new(SystemClock),
        Duration::from_secs(300),
    );
    let removed = sweeper.sweep_once().await?;

    tracing::info!(removed, "Expired one-time codes removed");
    Ok(removed)
}
