#[tokio::main]
async fn main() {
    if let Err(e) = medspace_lib::run().await {
        tracing::error!("MedSpace failed to start: {e}");
        eprintln!("medspace: {e}");
        std::process::exit(1);
    }
}
