use clap::Parser;
use classnotify_client::{Cli, run};

#[tokio::main]
async fn main() -> Result<(), classnotify_client::AppError> {
    run(Cli::parse()).await
}
