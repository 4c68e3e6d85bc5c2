#[tokio::main]
async fn main() {
    if let Err(e) = ashare_rps::cli::run().await {
        eprintln!("❌ Error: {}", e);
        std::process::exit(1);
    }
}
