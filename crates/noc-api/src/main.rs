#[tokio::main]
async fn main() {
    if let Err(err) = noc_api::run().await {
        tracing::error!(error = %err, "noc-api failed");
        std::process::exit(1);
    }
}
