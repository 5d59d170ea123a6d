use bizzmq_cli::run_cli;
use tracing::error;

#[tokio::main]
async fn main() {
    // Run CLI and exit with a code matching the error kind
    if let Err(e) = run_cli().await {
        error!("CLI error: {}", e);
        eprintln!("bizzmq: {}", e);
        std::process::exit(e.exit_code());
    }
}
