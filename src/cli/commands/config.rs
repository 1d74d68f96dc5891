use crate::cli::utils::output_json;
use crate::cli::OutputFormat;
use crate::config::config;

pub fn handle(output_format: OutputFormat) -> anyhow::Result<()> {
    let config = config();
    match output_format {
        OutputFormat::Json => output_json(config)?,
        OutputFormat::Text => {
            println!("Environment: {:?}", config.environment);
            println!("Block global update: {}", config.callbacks.block_global_update);
            println!("Preload max depth: {}", config.preload.max_depth);
            println!("Auto preload: {}", config.preload.auto_preload);
            println!("Query logging: {}", config.database.enable_query_logging);
            println!(
                "Slow query warning: {} ({}ms)",
                config.database.enable_slow_query_warning, config.database.slow_query_threshold_ms
            );
            println!("Max connections: {}", config.database.max_connections);
        }
    }
    Ok(())
}
