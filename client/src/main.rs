mod cli;
mod sse;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    cli::run().await
}
