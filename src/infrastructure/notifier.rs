use crate::domain::ports::{BalanceChange, BalanceNotifier};
use crate::error::{ReconError, Result};
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Writes balance changes to the structured log.
#[derive(Debug, Default, Clone)]
pub struct TracingNotifier;

#[async_trait]
impl BalanceNotifier for TracingNotifier {
    async fn notify(&self, change: BalanceChange) -> Result<()> {
        tracing::info!(
            user_id = %change.user_id,
            provider = %change.provider,
            reference = %change.reference,
            old_balance = %change.old_balance,
            new_balance = %change.new_balance,
            change = %change.change,
            "wallet balance updated"
        );
        Ok(())
    }
}

/// Forwards balance changes to a channel for an in-process consumer.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    sender: mpsc::UnboundedSender<BalanceChange>,
}

impl ChannelNotifier {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<BalanceChange>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl BalanceNotifier for ChannelNotifier {
    async fn notify(&self, change: BalanceChange) -> Result<()> {
        self.sender
            .send(change)
            .map_err(|e| ReconError::InternalError(Box::new(e)))
    }
}
