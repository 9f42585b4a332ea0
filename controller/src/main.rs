mod host;
mod ir;
mod sensor;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    host::run().await
}
