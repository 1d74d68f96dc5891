use std::time::Duration;

use serde_json::json;

use crate::cli::utils::output_json;
use crate::cli::OutputFormat;
use crate::config::config;
use crate::database::{CancelToken, PgExecutor, QueryExecutor};

/// Connect with `DATABASE_URL` and run a trivial query.
pub fn handle_ping(output_format: OutputFormat) -> anyhow::Result<()> {
    let runtime = tokio::runtime::Runtime::new()?;
    let settings = &config().database;
    let executor = PgExecutor::connect(runtime.handle().clone(), settings)?;

    let cancel = CancelToken::with_timeout(Duration::from_secs(settings.connection_timeout_secs));
    let rows = executor.query("SELECT 1 AS ok", &[], &cancel)?;
    let ok = rows.first().and_then(|row| row.get("ok")).is_some();

    match output_format {
        OutputFormat::Json => output_json(&json!({ "success": ok }))?,
        OutputFormat::Text if ok => println!("✓ Database reachable"),
        OutputFormat::Text => println!("✗ Database answered without rows"),
    }
    if ok {
        Ok(())
    } else {
        anyhow::bail!("database ping returned no rows")
    }
}
