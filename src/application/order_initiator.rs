use crate::domain::money::{Amount, Currency};
use crate::domain::payment::PaymentOrder;
use crate::domain::ports::PaymentGatewayBox;
use crate::error::{FeeError, Result};
use chrono::Utc;
use std::time::Duration;

/// Opens payment orders with the external gateway.
///
/// Every call is bounded by `timeout` and never retried here: a caller that
/// wants to retry must open a fresh order.
pub struct OrderInitiator {
    gateway: PaymentGatewayBox,
    timeout: Duration,
}

impl OrderInitiator {
    pub fn new(gateway: PaymentGatewayBox, timeout: Duration) -> Self {
        Self { gateway, timeout }
    }

    pub async fn open(&self, amount: Amount, currency: Currency) -> Result<PaymentOrder> {
        let order = tokio::time::timeout(self.timeout, self.gateway.create_order(amount, currency))
            .await
            .map_err(|_| {
                FeeError::GatewayUnavailable(format!(
                    "Order creation timed out after {:?}",
                    self.timeout
                ))
            })??;

        if order.amount != amount || order.currency != currency {
            tracing::error!(
                order_id = %order.order_id,
                requested = %amount,
                acknowledged = %order.amount,
                "Gateway acknowledged a different amount"
            );
            return Err(FeeError::GatewayRejected(format!(
                "Gateway acknowledged {} {} for a {} {} order",
                order.amount, order.currency, amount, currency
            )));
        }

        tracing::info!(order_id = %order.order_id, amount = %amount, "Order opened");
        Ok(PaymentOrder {
            order_id: order.order_id,
            amount: order.amount,
            currency: order.currency,
            created_at: Utc::now(),
        })
    }
}
