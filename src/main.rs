#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    caregrid::run().await
}
