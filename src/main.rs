#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tabreel_lib::run().await
}
