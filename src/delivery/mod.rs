//! Outbound delivery
//!
//! Formatted messages leave the system through a [`Delivery`]. Failures are
//! retried by [`RetryingDelivery`] with exponential backoff; the message
//! content never changes between attempts.

pub mod console;
pub mod telegram;

pub use console::ConsoleDelivery;
pub use telegram::TelegramDelivery;

use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use crate::types::{AppError, AppResult};
use crate::utils::retry::{with_retry, RetryPolicy};

/// Where a message is shown. Drives formatting as well as delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Ui,
    Telegram,
    Sms,
    Console,
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Channel::Ui => write!(f, "ui"),
            Channel::Telegram => write!(f, "telegram"),
            Channel::Sms => write!(f, "sms"),
            Channel::Console => write!(f, "console"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    pub channel: Channel,
    pub recipient: String,
    pub message_id: Option<String>,
    pub attempts: u32,
}

#[async_trait]
pub trait Delivery: Send + Sync {
    fn channel(&self) -> Channel;

    async fn deliver(&self, recipient: &str, message: &str) -> AppResult<Ack>;
}

pub struct RetryingDelivery {
    inner: Arc<dyn Delivery>,
    policy: RetryPolicy,
}

impl RetryingDelivery {
    pub fn new(inner: Arc<dyn Delivery>, max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            inner,
            policy: RetryPolicy::new(max_attempts, base_delay),
        }
    }

    /// Sends to every recipient; one failed recipient does not stop the rest.
    pub async fn broadcast(&self, recipients: &[String], message: &str) -> Vec<AppResult<Ack>> {
        join_all(recipients.iter().map(|r| self.deliver(r, message))).await
    }
}

#[async_trait]
impl Delivery for RetryingDelivery {
    fn channel(&self) -> Channel {
        self.inner.channel()
    }

    async fn deliver(&self, recipient: &str, message: &str) -> AppResult<Ack> {
        let inner = &self.inner;
        let result = with_retry(&self.policy, |attempt| async move {
            inner
                .deliver(recipient, message)
                .await
                .map(|ack| Ack { attempts: attempt, ..ack })
        })
        .await;

        match result {
            Ok(ack) => {
                info!(channel = %ack.channel, recipient = %recipient, attempts = ack.attempts, "Message delivered");
                Ok(ack)
            }
            Err(e) => {
                error!(channel = %self.inner.channel(), recipient = %recipient, error = %e, "Delivery failed");
                Err(AppError::DeliveryFailure {
                    attempts: self.policy.max_attempts,
                    reason: e.to_string(),
                })
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Records every message; fails the first `failures` calls
    pub(crate) struct RecordingDelivery {
        pub sent: Mutex<Vec<(String, String)>>,
        failures: Mutex<u32>,
    }

    impl RecordingDelivery {
        pub(crate) fn new(failures: u32) -> Self {
            Self {
                sent: Mutex::new(Vec::new()),
                failures: Mutex::new(failures),
            }
        }
    }

    #[async_trait]
    impl Delivery for RecordingDelivery {
        fn channel(&self) -> Channel {
            Channel::Console
        }

        async fn deliver(&self, recipient: &str, message: &str) -> AppResult<Ack> {
            {
                let mut failures = self.failures.lock().unwrap();
                if *failures > 0 {
                    *failures -= 1;
                    return Err(AppError::Internal("gateway timeout".to_string()));
                }
            }
            self.sent
                .lock()
                .unwrap()
                .push((recipient.to_string(), message.to_string()));
            Ok(Ack {
                channel: Channel::Console,
                recipient: recipient.to_string(),
                message_id: None,
                attempts: 1,
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_until_delivered() {
        let inner = Arc::new(RecordingDelivery::new(2));
        let delivery = RetryingDelivery::new(inner.clone(), 3, Duration::from_millis(100));
        let ack = delivery.deliver("farmer", "hello").await.unwrap();
        assert_eq!(ack.attempts, 3);
        assert_eq!(inner.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reports_failure_after_budget() {
        let inner = Arc::new(RecordingDelivery::new(5));
        let delivery = RetryingDelivery::new(inner.clone(), 2, Duration::from_millis(100));
        let err = delivery.deliver("farmer", "hello").await.unwrap_err();
        assert!(matches!(err, AppError::DeliveryFailure { attempts: 2, .. }));
        assert!(inner.sent.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_broadcast_continues_past_failures() {
        let inner = Arc::new(RecordingDelivery::new(1));
        let delivery = RetryingDelivery::new(inner.clone(), 1, Duration::from_millis(100));
        let results = delivery
            .broadcast(&["a".to_string(), "b".to_string()], "same text")
            .await;
        assert!(results[0].is_err());
        assert!(results[1].is_ok());
        assert_eq!(inner.sent.lock().unwrap()[0], ("b".to_string(), "same text".to_string()));
    }
}
