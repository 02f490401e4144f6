//! did-gateway entrypoint

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    did_gateway::server::run().await
}
