#[tokio::main]
async fn main() -> anyhow::Result<()> {
    laburen_trust::server::run().await
}
