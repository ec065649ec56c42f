use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info");
    }
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let ax = wed_gallery::build().await?;

    let host = ax.get("http.host").unwrap_or_else(|| "127.0.0.1".to_string());
    let port = ax.get("http.port").unwrap_or_else(|| "3000".to_string());

    let addr = format!("{host}:{port}");

    println!("[wed-gallery] listening on http://{addr}");

    ax.listen(addr).await?;

    Ok(())
}
