use clap::Subcommand;
use serde::Serialize;

use crate::callback::{Callbacks, ChainKind};
use crate::cli::utils::{output_error, output_json};
use crate::cli::OutputFormat;

#[derive(Subcommand)]
pub enum CallbackCommands {
    #[command(about = "List steps of one chain, or of every chain")]
    List {
        #[arg(long, value_enum, help = "Only this chain")]
        kind: Option<ChainKind>,
    },

    #[command(about = "Resolve every chain and report cycles")]
    Check,
}

#[derive(Debug, Serialize)]
struct ChainListing {
    kind: ChainKind,
    steps: Vec<StepListing>,
}

#[derive(Debug, Serialize)]
struct StepListing {
    name: String,
    always: bool,
}

fn listing(callbacks: &Callbacks, kind: ChainKind) -> anyhow::Result<ChainListing> {
    let steps = callbacks
        .resolve(kind)?
        .iter()
        .map(|step| StepListing { name: step.name.clone(), always: step.always })
        .collect();
    Ok(ChainListing { kind, steps })
}

pub fn handle(cmd: CallbackCommands, output_format: OutputFormat) -> anyhow::Result<()> {
    let callbacks = Callbacks::default();

    match cmd {
        CallbackCommands::List { kind } => {
            let kinds = match kind {
                Some(kind) => vec![kind],
                None => ChainKind::ALL.to_vec(),
            };
            let listings = kinds
                .into_iter()
                .map(|kind| listing(&callbacks, kind))
                .collect::<anyhow::Result<Vec<_>>>()?;

            match output_format {
                OutputFormat::Json => output_json(&listings)?,
                OutputFormat::Text => {
                    for chain in &listings {
                        println!("{} ({} steps)", chain.kind, chain.steps.len());
                        for (index, step) in chain.steps.iter().enumerate() {
                            let marker = if step.always { "  [always]" } else { "" };
                            println!("  {:>2}. {}{}", index + 1, step.name, marker);
                        }
                    }
                }
            }
            Ok(())
        }
        CallbackCommands::Check => match callbacks.validate() {
            Ok(()) => {
                match output_format {
                    OutputFormat::Json => output_json(&serde_json::json!({ "success": true }))?,
                    OutputFormat::Text => println!("✓ All chains resolve"),
                }
                Ok(())
            }
            Err(e) => {
                output_error(output_format, &e.to_string(), Some("CALLBACK_CYCLE"))?;
                Err(e.into())
            }
        },
    }
}
