use std::time::Duration;

use retrying_http::{
    CancellationToken, RequestDescriptor, RequestError, RetryPolicy, RetryingRequestExecutor,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let url = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "https://httpbin.org/delay/10".to_owned());

    let executor = RetryingRequestExecutor::reqwest();
    let policy = RetryPolicy::default()
        .with_max_attempts(3)
        .with_timeout(Duration::from_secs(30));
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        trigger.cancel();
    });

    match executor
        .execute_with_cancel(&RequestDescriptor::get(&url), &policy, &cancel)
        .await
    {
        Ok(response) => println!("{} -> {}", url, response.status),
        Err(RequestError::Cancelled) => println!("{url} cancelled"),
        Err(err) => return Err(err.into()),
    }

    Ok(())
}
