#[tokio::main]
async fn main() -> anyhow::Result<()> {
    inspekt_worker::run().await
}
