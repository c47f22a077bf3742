//! Timed single-stream HTTP transfers

use rand::Rng;
use speedlog_core::{ProviderError, TransferRate};
use std::time::{Duration, Instant};
use tracing::debug;

/// When a transfer phase stops
#[derive(Debug, Clone, Copy)]
pub struct TransferBudget {
    pub max_bytes: u64,
    pub max_duration: Duration,
}

impl TransferBudget {
    fn exhausted(&self, bytes: u64, elapsed: Duration) -> bool {
        bytes >= self.max_bytes || elapsed >= self.max_duration
    }
}

pub(crate) fn request_error(e: reqwest::Error) -> ProviderError {
    ProviderError::Request(e.to_string())
}

/// Fetch the images at `urls` in turn (cycling) until the budget is spent
pub async fn download(
    client: &reqwest::Client,
    urls: &[String],
    budget: TransferBudget,
) -> Result<TransferRate, ProviderError> {
    if urls.is_empty() {
        return Err(ProviderError::Unsupported("no download sizes configured".to_string()));
    }

    let start = Instant::now();
    let mut bytes: u64 = 0;

    'outer: for url in urls.iter().cycle() {
        let mut response = client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(request_error)?;

        while let Some(chunk) = response.chunk().await.map_err(request_error)? {
            bytes += chunk.len() as u64;
            if budget.exhausted(bytes, start.elapsed()) {
                break 'outer;
            }
        }
        debug!("Downloaded {} ({} bytes so far)", url, bytes);

        if budget.exhausted(bytes, start.elapsed()) {
            break;
        }
    }

    finish(bytes, start.elapsed())
}

/// POST random payloads to `url` until the budget is spent
pub async fn upload(
    client: &reqwest::Client,
    url: &str,
    payload_size: usize,
    budget: TransferBudget,
) -> Result<TransferRate, ProviderError> {
    let mut payload = vec![0u8; payload_size];
    rand::thread_rng().fill(&mut payload[..]);

    let start = Instant::now();
    let mut bytes: u64 = 0;

    while !budget.exhausted(bytes, start.elapsed()) {
        client
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(payload.clone())
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(request_error)?;

        bytes += payload.len() as u64;
        debug!("Uploaded {} bytes so far", bytes);
    }

    finish(bytes, start.elapsed())
}

fn finish(bytes: u64, elapsed: Duration) -> Result<TransferRate, ProviderError> {
    if bytes == 0 {
        return Err(ProviderError::InvalidResponse("no data transferred".to_string()));
    }
    Ok(TransferRate::from_transfer(bytes, elapsed))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_budget() {
        let budget = TransferBudget {
            max_bytes: 1000,
            max_duration: Duration::from_secs(5),
        };
        assert!(!budget.exhausted(999, Duration::from_secs(1)));
        assert!(budget.exhausted(1000, Duration::from_secs(1)));
        assert!(budget.exhausted(10, Duration::from_secs(5)));
    }

    #[test]
    fn test_empty_transfer_is_an_error() {
        assert!(finish(0, Duration::from_secs(1)).is_err());
        let rate = finish(1_000_000, Duration::from_secs(1)).unwrap();
        assert_eq!(rate.mbps(), 8.0);
    }

    #[tokio::test]
    async fn test_download_without_urls() {
        let client = reqwest::Client::new();
        let budget = TransferBudget {
            max_bytes: 1,
            max_duration: Duration::from_secs(1),
        };
        let err = download(&client, &[], budget).await.unwrap_err();
        assert!(matches!(err, ProviderError::Unsupported(_)));
    }
}
