#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    odtemp_cli::run().await
}
