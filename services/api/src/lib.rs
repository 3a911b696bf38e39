mod cli;
mod commands;
mod infra;
mod report;
mod routes;
mod server;

use pai_hazard::error::AppError;

pub async fn run() -> Result<(), AppError> {
    cli::run().await
}
