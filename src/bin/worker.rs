#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = testprep_rust::run_worker().await {
        eprintln!("testprep-worker fatal: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}
