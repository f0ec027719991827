#[cfg(feature = "cli")]
mod cli;

use colored::Colorize;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();
    match cli::run().await {
        Ok(_) => {}
        Err(e) if e.is_informational() => {
            println!("{}", e.to_string().yellow());
        }
        Err(e) => {
            eprintln!("{}", e.to_string().red());
            std::process::exit(1);
        }
    }
}
