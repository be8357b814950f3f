use std::time::Duration;

use retrying_http::{ApiClient, ApiConfig};
use serde_json::json;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().init();

    let config = ApiConfig::from_env().unwrap_or_else(|_| {
        ApiConfig::new("https://httpbin.org")
            .with_timeout(Duration::from_secs(5))
            .with_retry_count(2)
    });
    let api = ApiClient::new(config);

    let response = api.get("/get").await?;
    println!("GET {} -> {}", api.url("/get"), response.status);

    let response = api.post("/post", &json!({ "name": "Kit" })).await?;
    println!("POST -> {} {}", response.status, response.body);

    Ok(())
}
