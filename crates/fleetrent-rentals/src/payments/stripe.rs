use async_trait::async_trait;
use reqwest::Response;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, warn};

use super::{
    to_minor_units, GatewayError, PaymentGateway, PaymentIntent, PaymentMetadata, RefundReceipt,
};
use crate::config::PaymentGatewayConfig;

/// Stripe REST adapter. One request per call, no retries.
#[derive(Debug, Clone)]
pub struct StripeGateway {
    http_client: reqwest::Client,
    base_url: String,
    secret_key: String,
}

#[derive(Debug, Deserialize)]
struct StripeObject {
    id: String,
    #[serde(default)]
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StripeErrorResponse {
    error: StripeErrorBody,
}

#[derive(Debug, Deserialize)]
struct StripeErrorBody {
    message: String,
}

impl StripeGateway {
    pub fn new(config: &PaymentGatewayConfig) -> Result<Self, GatewayError> {
        if config.secret_key.is_empty() {
            return Err(GatewayError::new("payment gateway secret key is not configured"));
        }
        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| GatewayError::new(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http_client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            secret_key: config.secret_key.clone(),
        })
    }

    async fn post_form<T: DeserializeOwned>(
        &self,
        path: &str,
        form: &[(String, String)],
    ) -> Result<T, GatewayError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&self.secret_key)
            .form(form)
            .send()
            .await
            .map_err(|e| GatewayError::new(format!("payment gateway request failed: {e}")))?;
        Self::handle_response(response).await
    }

    async fn handle_response<T: DeserializeOwned>(response: Response) -> Result<T, GatewayError> {
        let status = response.status();
        if status.is_success() {
            return response.json().await.map_err(|e| {
                GatewayError::new(format!("invalid payment gateway response: {e}"))
            });
        }

        let error_text = response.text().await.unwrap_or_default();
        match serde_json::from_str::<StripeErrorResponse>(&error_text) {
            Ok(body) => Err(GatewayError::new(body.error.message)),
            Err(_) => Err(GatewayError::new(format!(
                "payment gateway returned {status}: {error_text}"
            ))),
        }
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    async fn create_payment_intent(
        &self,
        amount: Decimal,
        currency: &str,
        metadata: &PaymentMetadata,
    ) -> Result<PaymentIntent, GatewayError> {
        let minor = to_minor_units(amount)
            .filter(|m| *m > 0)
            .ok_or_else(|| GatewayError::new(format!("amount {amount} cannot be charged")))?;

        let mut form = vec![
            ("amount".to_string(), minor.to_string()),
            ("currency".to_string(), currency.to_string()),
        ];
        form.extend(
            metadata
                .iter()
                .map(|(k, v)| (format!("metadata[{k}]"), v.clone())),
        );

        let intent: StripeObject = self.post_form("/v1/payment_intents", &form).await?;
        debug!(intent_id = %intent.id, amount = %amount, currency, "Created payment intent");
        Ok(PaymentIntent {
            intent_id: intent.id,
        })
    }

    async fn refund(&self, intent_id: &str) -> Result<RefundReceipt, GatewayError> {
        let form = vec![("payment_intent".to_string(), intent_id.to_string())];
        let refund: StripeObject = self.post_form("/v1/refunds", &form).await?;

        if refund.status.as_deref() == Some("failed") {
            warn!(intent_id, refund_id = %refund.id, "Refund failed at the gateway");
            return Err(GatewayError::new(format!(
                "refund {} for {intent_id} failed",
                refund.id
            )));
        }
        Ok(RefundReceipt {
            refund_id: refund.id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requires_secret_key() {
        let config = PaymentGatewayConfig::default();
        assert!(StripeGateway::new(&config).is_err());
    }

    #[test]
    fn test_trailing_slash_is_trimmed() {
        let config = PaymentGatewayConfig {
            base_url: "http://localhost:12111/".into(),
            secret_key: "sk_test_123".into(),
            ..Default::default()
        };
        let gateway = StripeGateway::new(&config).unwrap();
        assert_eq!(gateway.base_url, "http://localhost:12111");
    }
}
