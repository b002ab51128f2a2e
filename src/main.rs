#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    sovereign_relay::run().await
}
