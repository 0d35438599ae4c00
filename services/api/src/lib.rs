mod cli;
mod infra;
mod report;
mod routes;
mod server;

use academy_ops::error::AppError;

pub async fn run() -> Result<(), AppError> {
    cli::run().await
}
