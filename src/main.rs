#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = testprep_rust::run().await {
        eprintln!("testprep-rust fatal: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}
