use clap::Parser;

use apiflow::cli::Args;
use apiflow::logging::init_logging;
use apiflow::status::ExitStatus;

#[tokio::main]
async fn main() -> ExitStatus {
    let args = Args::parse();
    init_logging(args.verbose, args.log_format);

    if let Err(e) = ctrlc::set_handler(|| {
        eprintln!("\nInterrupted");
        std::process::exit(ExitStatus::Interrupted as i32);
    }) {
        tracing::warn!("Failed to install Ctrl+C handler: {}", e);
    }

    match apiflow::core::run(&args).await {
        Ok(status) => status,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitStatus::Error
        }
    }
}
