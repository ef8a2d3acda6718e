use crate::domain::money::{Amount, Currency};
use crate::domain::payment::OrderId;
use crate::domain::ports::{GatewayOrder, PaymentGateway};
use crate::error::Result;
use async_trait::async_trait;
use uuid::Uuid;

/// Offline gateway that accepts every order.
///
/// Issues `order_<uuid>` identifiers without contacting anything. Useful for
/// local runs and tests; callbacks are signed with the configured secret.
#[derive(Debug, Default, Clone)]
pub struct SandboxGateway;

impl SandboxGateway {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PaymentGateway for SandboxGateway {
    async fn create_order(&self, amount: Amount, currency: Currency) -> Result<GatewayOrder> {
        let order_id = OrderId::new(format!("order_{}", Uuid::new_v4().simple()))?;
        tracing::debug!(order_id = %order_id, "Sandbox order created");
        Ok(GatewayOrder {
            order_id,
            amount,
            currency,
        })
    }
}
