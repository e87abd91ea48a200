//! Outbound side of the pipeline: the channel contract towards the remote
//! accounting service and the rate-limiting wrapper applied to it.

use crate::domain::VmRecord;
use crate::error::Result;
use crate::rate_limiter::RateLimiter;
use async_trait::async_trait;
use tracing::info;

pub mod http;

pub use http::HttpDeliveryChannel;

/// Rate-limited sender towards the remote accounting service.
///
/// `write` accepts one record at a time and may suspend under the send
/// budget. `send_identifier` announces the record stream's identity once per
/// run; `finish` signals end-of-stream and releases the connection and must
/// run exactly once per run.
#[async_trait]
pub trait DeliveryChannel: Send + Sync {
    async fn write(&self, record: &VmRecord) -> Result<()>;
    async fn send_identifier(&self) -> Result<()>;
    async fn finish(&self);
}

/// Wraps any channel with the token-bucket send budget. Without a budget it
/// is a transparent passthrough.
pub struct RateLimitedChannel<C> {
    inner: C,
    limiter: Option<RateLimiter>,
}

impl<C> RateLimitedChannel<C> {
    pub fn new(inner: C, records_per_min: Option<u64>) -> Self {
        Self {
            inner,
            limiter: records_per_min.map(RateLimiter::per_minute),
        }
    }
}

#[async_trait]
impl<C: DeliveryChannel> DeliveryChannel for RateLimitedChannel<C> {
    async fn write(&self, record: &VmRecord) -> Result<()> {
        if let Some(limiter) = &self.limiter {
            limiter.acquire().await;
        }
        self.inner.write(record).await
    }

    async fn send_identifier(&self) -> Result<()> {
        self.inner.send_identifier().await
    }

    async fn finish(&self) {
        self.inner.finish().await
    }
}

/// Channel for dry runs: records are logged instead of transmitted.
#[derive(Debug, Default)]
pub struct LogChannel;

#[async_trait]
impl DeliveryChannel for LogChannel {
    async fn write(&self, record: &VmRecord) -> Result<()> {
        info!(
            vm_uuid = %record.vm_uuid,
            machine_name = %record.machine_name,
            "dry run: record prepared"
        );
        Ok(())
    }

    async fn send_identifier(&self) -> Result<()> {
        Ok(())
    }

    async fn finish(&self) {
        info!("dry run: stream finished");
    }
}
