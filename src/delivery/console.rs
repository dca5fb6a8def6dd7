use async_trait::async_trait;

use super::{Ack, Channel, Delivery};
use crate::types::AppResult;

/// Prints messages to stdout. Used by the CLI and when no bot is configured.
#[derive(Debug, Default)]
pub struct ConsoleDelivery;

#[async_trait]
impl Delivery for ConsoleDelivery {
    fn channel(&self) -> Channel {
        Channel::Console
    }

    async fn deliver(&self, recipient: &str, message: &str) -> AppResult<Ack> {
        println!("── to {} ──\n{}\n", recipient, message);
        Ok(Ack {
            channel: Channel::Console,
            recipient: recipient.to_string(),
            message_id: None,
            attempts: 1,
        })
    }
}
