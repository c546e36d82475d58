use std::time::Duration;

use reqwest::Method;
use resilient_http::{CancelToken, Client, ClientOptions, Request};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let url = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "https://httpbin.org/status/503".to_owned());

    let client = Client::new()
        .with_options(ClientOptions::from_env()?)
        .with_log_fn(|line| eprintln!("{line}"));

    let cancel = CancelToken::new().with_timeout(Duration::from_secs(60));
    let request = Request::new(Method::GET, &url)?.with_cancel(cancel);

    match client.execute(request).await {
        Ok(response) => println!("{} {}", response.status(), response.text().await?),
        Err(err) => eprintln!("request failed: {err}"),
    }

    Ok(())
}
