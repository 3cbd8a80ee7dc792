//! Paystack payment gateway: REST client, webhook signature check and the
//! `PaymentGateway` port the services depend on.

pub mod client;
pub mod signature;

pub use client::PaystackClient;
pub use signature::{sign, verify_signature};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Paystack rejected the request: {0}")]
    Api(String),
    #[error("Invalid response from Paystack: {0}")]
    InvalidResponse(String),
    #[error("Circuit breaker open - Paystack API unavailable")]
    CircuitBreakerOpen,
}

#[derive(Debug, Clone, Serialize)]
pub struct InitializeRequest {
    pub email: String,
    /// Amount in kobo.
    pub amount: i64,
    pub reference: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub callback_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Authorization {
    pub authorization_url: String,
    pub access_code: String,
    pub reference: String,
}

/// `data` of `GET /transaction/verify/:reference`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Verification {
    pub status: String,
    pub reference: String,
    /// Amount in kobo.
    pub amount: i64,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub paid_at: Option<String>,
    #[serde(default)]
    pub gateway_response: Option<String>,
    #[serde(default)]
    pub currency: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecipientRequest {
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    pub account_number: String,
    pub bank_code: String,
    pub currency: String,
}

impl RecipientRequest {
    pub fn nuban(name: &str, account_number: &str, bank_code: &str) -> Self {
        Self {
            kind: "nuban".to_string(),
            name: name.to_string(),
            account_number: account_number.to_string(),
            bank_code: bank_code.to_string(),
            currency: "NGN".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TransferRequest {
    pub source: String,
    /// Amount in kobo.
    pub amount: i64,
    pub recipient: String,
    pub reference: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Transfer {
    pub transfer_code: String,
    pub status: String,
    #[serde(default)]
    pub reference: Option<String>,
}

/// What a verified gateway status means for the local transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChargeOutcome {
    Succeeded,
    Failed,
    /// Still in flight on the gateway side; nothing to record yet.
    Undecided,
}

impl ChargeOutcome {
    pub fn from_gateway_status(status: &str) -> Self {
        match status {
            "success" => Self::Succeeded,
            "failed" | "abandoned" | "reversed" => Self::Failed,
            _ => Self::Undecided,
        }
    }
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn initialize(&self, request: &InitializeRequest) -> Result<Authorization, GatewayError>;
    async fn verify(&self, reference: &str) -> Result<Verification, GatewayError>;
    /// Returns the recipient code for a bank account.
    async fn create_recipient(&self, request: &RecipientRequest) -> Result<String, GatewayError>;
    async fn initiate_transfer(&self, request: &TransferRequest) -> Result<Transfer, GatewayError>;
}
