//! crudql CLI entry point.

use crudql::cli::{self, Cli};
use crudql::core::Result;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse_args();

    cli::execute(cli).await
}
