#[tokio::main]
async fn main() -> anyhow::Result<()> {
    incubator_bridge::host::run().await
}
