use crate::domain::ports::Notifier;
use crate::error::Result;
use async_trait::async_trait;

/// Notification sink that only logs the message.
///
/// Stands in for email delivery, which lives outside this crate.
#[derive(Debug, Default, Clone)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn send(&self, recipient: &str, subject: &str, body: &str) -> Result<()> {
        tracing::info!(recipient, subject, body, "Notification sent");
        Ok(())
    }
}
