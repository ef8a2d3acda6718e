use crate::application::order_initiator::OrderInitiator;
use crate::application::orchestrator::PaymentOrchestrator;
use crate::domain::fee_schedule::{FeeSchedule, FeeSchedules, Program};
use crate::domain::money::{Amount, Currency};
use crate::domain::payment::TenantId;
use crate::domain::ports::{OrderBookBox, PaymentGatewayBox, PaymentLedgerBox};
use crate::domain::signature::SignatureVerifier;
use crate::error::{FeeError, Result};
use crate::infrastructure::http_gateway::{HttpGateway, HttpGatewayConfig};
use crate::infrastructure::sandbox::SandboxGateway;
use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Prefix of environment variables overriding configuration, e.g.
/// `FEELEDGER_GATEWAY__TIMEOUT_MS=5000`.
pub const ENV_PREFIX: &str = "FEELEDGER_";

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum GatewayMode {
    #[default]
    Sandbox,
    Http,
}

fn default_base_url() -> String {
    "https://api.razorpay.com".to_string()
}

fn default_timeout_ms() -> u64 {
    10_000
}

fn empty_secret() -> SecretString {
    SecretString::new(String::new())
}

#[derive(Deserialize, Debug, Clone)]
pub struct GatewayConfig {
    #[serde(default)]
    pub mode: GatewayMode,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub key_id: String,
    #[serde(default = "empty_secret")]
    pub key_secret: SecretString,
    /// Upper bound on opening one order.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            mode: GatewayMode::default(),
            base_url: default_base_url(),
            key_id: String::new(),
            key_secret: empty_secret(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

/// Fee overrides on top of the standard schedule.
#[derive(Deserialize, Debug, Clone, Default)]
pub struct FeesConfig {
    #[serde(default)]
    pub programs: HashMap<Program, Amount>,
    /// Per-tenant overrides, applied on top of `programs`.
    #[serde(default)]
    pub tenants: HashMap<String, HashMap<Program, Amount>>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct FeeLedgerConfig {
    #[serde(default)]
    pub currency: Currency,
    #[serde(default)]
    pub gateway: GatewayConfig,
    /// Shared secret the gateway signs callbacks with.
    #[serde(default = "empty_secret")]
    pub signing_secret: SecretString,
    #[serde(default)]
    pub fees: FeesConfig,
}

impl FeeLedgerConfig {
    /// Layers an optional YAML file under `FEELEDGER_*` environment variables,
    /// using `__` to separate nested keys.
    pub fn figment(path: Option<&Path>) -> Figment {
        let mut figment = Figment::new();
        if let Some(path) = path {
            figment = figment.merge(Yaml::file(path));
        }
        figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path
            && !path.exists()
        {
            return Err(FeeError::Config(format!(
                "Config file {} does not exist",
                path.display()
            )));
        }
        Ok(Self::figment(path).extract()?)
    }

    pub fn fee_schedules(&self) -> Result<FeeSchedules> {
        let default = FeeSchedule::standard()
            .with_overrides(&self.fees.programs)
            .with_currency(self.currency);

        let mut schedules = FeeSchedules::new(default.clone());
        for (tenant, overrides) in &self.fees.tenants {
            schedules = schedules.with_tenant(
                TenantId::new(tenant.clone())?,
                default.with_overrides(overrides),
            );
        }
        Ok(schedules)
    }

    pub fn verifier(&self) -> Result<SignatureVerifier> {
        SignatureVerifier::new(self.signing_secret.clone())
    }

    pub fn order_timeout(&self) -> Duration {
        Duration::from_millis(self.gateway.timeout_ms)
    }

    pub fn gateway(&self) -> Result<PaymentGatewayBox> {
        match self.gateway.mode {
            GatewayMode::Sandbox => Ok(Box::new(SandboxGateway::new())),
            GatewayMode::Http => {
                if self.gateway.key_id.is_empty()
                    || self.gateway.key_secret.expose_secret().is_empty()
                {
                    return Err(FeeError::Config(
                        "gateway.key_id and gateway.key_secret are required in http mode"
                            .to_string(),
                    ));
                }
                Ok(Box::new(HttpGateway::new(HttpGatewayConfig {
                    base_url: self.gateway.base_url.clone(),
                    key_id: self.gateway.key_id.clone(),
                    key_secret: self.gateway.key_secret.clone(),
                    timeout: self.order_timeout(),
                })?))
            }
        }
    }

    /// Wires an orchestrator over the given stores.
    pub fn orchestrator(
        &self,
        ledger: PaymentLedgerBox,
        orders: OrderBookBox,
    ) -> Result<PaymentOrchestrator> {
        let initiator = OrderInitiator::new(self.gateway()?, self.order_timeout());
        Ok(PaymentOrchestrator::new(
            self.fee_schedules()?,
            initiator,
            self.verifier()?,
            ledger,
            orders,
        )
        .with_notifier(Arc::new(crate::infrastructure::notifier::TracingNotifier)))
    }
}

impl Default for FeeLedgerConfig {
    fn default() -> Self {
        Self {
            currency: Currency::default(),
            gateway: GatewayConfig::default(),
            signing_secret: empty_secret(),
            fees: FeesConfig::default(),
        }
    }
}
