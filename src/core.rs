//! Main execution logic for the command-line interface

use anyhow::Context;
use tracing::{error, info, warn};

use crate::cli::{parse_params, Args};
use crate::config::load_config;
use crate::engine::{ActionRunner, RunnerOptions};
use crate::errors::ApiFlowError;
use crate::status::ExitStatus;

/// Run the CLI: load the configuration, then list, validate, or perform.
pub async fn run(args: &Args) -> anyhow::Result<ExitStatus> {
    let config = load_config(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    if args.list {
        for (name, action) in &config.actions {
            if action.description.is_empty() {
                println!("{}", name);
            } else {
                println!("{:<24} {}", name, action.description);
            }
        }
        return Ok(ExitStatus::Success);
    }

    let timeout = std::time::Duration::try_from_secs_f64(args.timeout)
        .map_err(|_| ApiFlowError::Argument(format!("Invalid timeout: {}", args.timeout)))?;
    let options = RunnerOptions {
        timeout,
        max_depth: args.max_depth,
    };
    let mut runner = ActionRunner::with_options(config, options)?;

    if args.validate {
        return Ok(match runner.validate() {
            Ok(warnings) => {
                for warning in &warnings {
                    warn!("{}", warning);
                }
                println!("Configuration is valid");
                ExitStatus::Success
            }
            Err(errors) => {
                for message in &errors {
                    error!("{}", message);
                }
                eprintln!("Configuration is invalid ({} error(s))", errors.len());
                ExitStatus::Error
            }
        });
    }

    let action = args
        .action
        .as_deref()
        .context("An action name is required (or use --list / --validate)")?;
    let params = parse_params(&args.params)?;

    match runner.perform_action(action, params).await {
        Ok(()) => {
            info!(action, "action completed");
            Ok(ExitStatus::Success)
        }
        Err(e) => {
            error!(error = %e, action, "action failed");
            Ok(ExitStatus::Error)
        }
    }
}
