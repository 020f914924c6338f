use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::env;
use uuid::Uuid;

use crate::error::{invalid_input_error, upstream_error, Error};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Authorization {
    pub external_reference: String,
    pub redirect_url: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChargeStatus {
    Charged,
    Cancelled,
    Other,
}

/// Narrow capability the engine needs from whichever payment provider
/// is wired in. The engine never sees provider protocol details
/// beyond this surface.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn authorize(
        &self,
        amount: i64,
        currency: &str,
        payer_reference: Uuid,
        order_reference: Uuid,
    ) -> Result<Authorization, Error>;

    async fn get_status(&self, external_reference: &str) -> Result<ChargeStatus, Error>;

    async fn refund(&self, external_reference: &str, amount: i64) -> Result<(), Error>;
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct ChargeResponse {
    status: String,
    external_reference: Option<String>,
    redirect_url: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct StatusResponse {
    status: String,
    charge_status: Option<ChargeStatus>,
}

pub struct HttpGateway;

#[async_trait]
impl PaymentGateway for HttpGateway {
    #[tracing::instrument(skip(self))]
    async fn authorize(
        &self,
        amount: i64,
        currency: &str,
        payer_reference: Uuid,
        order_reference: Uuid,
    ) -> Result<Authorization, Error> {
        let api_base = env::var("PAYMENT_GATEWAY_API_BASE")?;
        let url = format!("https://{}/v1/charges", api_base);
        let key = env::var("PAYMENT_GATEWAY_API_KEY")?;

        let res = reqwest::Client::new()
            .post(url)
            .bearer_auth(key)
            .json(&serde_json::json!({
                "amount": amount,
                "currency": currency,
                "payer_reference": payer_reference,
                "order_reference": order_reference,
            }))
            .send()
            .await?;

        let status_code = res.status().as_u16();

        if status_code >= 400 && status_code < 500 {
            return Err(invalid_input_error());
        } else if status_code != 200 && status_code != 201 {
            return Err(upstream_error());
        }

        let data: ChargeResponse = res.json().await?;

        if data.status != "OK" {
            return Err(upstream_error());
        }

        let external_reference = data.external_reference.ok_or_else(|| upstream_error())?;

        Ok(Authorization {
            external_reference,
            redirect_url: data.redirect_url,
        })
    }

    #[tracing::instrument(skip(self))]
    async fn get_status(&self, external_reference: &str) -> Result<ChargeStatus, Error> {
        let api_base = env::var("PAYMENT_GATEWAY_API_BASE")?;
        let url = format!("https://{}/v1/charges/{}", api_base, external_reference);
        let key = env::var("PAYMENT_GATEWAY_API_KEY")?;

        let res = reqwest::Client::new()
            .get(url)
            .bearer_auth(key)
            .send()
            .await?;

        let status_code = res.status().as_u16();

        if status_code >= 400 && status_code < 500 {
            return Err(invalid_input_error());
        } else if status_code != 200 {
            return Err(upstream_error());
        }

        let data: StatusResponse = res.json().await?;

        if data.status != "OK" {
            return Err(upstream_error());
        }

        Ok(data.charge_status.unwrap_or(ChargeStatus::Other))
    }

    #[tracing::instrument(skip(self))]
    async fn refund(&self, external_reference: &str, amount: i64) -> Result<(), Error> {
        let api_base = env::var("PAYMENT_GATEWAY_API_BASE")?;
        let url = format!(
            "https://{}/v1/charges/{}/refunds",
            api_base, external_reference
        );
        let key = env::var("PAYMENT_GATEWAY_API_KEY")?;

        let res = reqwest::Client::new()
            .post(url)
            .bearer_auth(key)
            .json(&serde_json::json!({ "amount": amount }))
            .send()
            .await?;

        let status_code = res.status().as_u16();

        if status_code >= 400 && status_code < 500 {
            return Err(invalid_input_error());
        } else if status_code != 200 && status_code != 201 {
            return Err(upstream_error());
        }

        Ok(())
    }
}
