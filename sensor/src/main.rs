mod host;
mod thermocouple;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    host::run().await
}
