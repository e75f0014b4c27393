// src/main.rs

use std::process::ExitCode;

use etldag::{cli, logging, run};

#[tokio::main]
async fn main() -> ExitCode {
    let args = cli::parse();
    if let Err(err) = logging::init_logging(args.log_level) {
        eprintln!("etldag: failed to initialise logging: {err:?}");
        return ExitCode::FAILURE;
    }

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("etldag error: {err:#}");
            ExitCode::FAILURE
        }
    }
}
