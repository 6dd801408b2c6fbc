mod cli;

use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let (addr, config, log_filter) = match cli::run() {
        cli::RunOutcome::Serve {
            addr,
            config,
            log_filter,
        } => (addr, config, log_filter),
        cli::RunOutcome::Exit(code) => std::process::exit(code),
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Err(err) = padel_notify::serve(addr, *config).await {
        tracing::error!(error = %err, "server stopped");
        std::process::exit(1);
    }
}
