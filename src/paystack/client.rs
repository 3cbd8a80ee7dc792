use async_trait::async_trait;
use failsafe::futures::CircuitBreaker;
use failsafe::{backoff, failure_policy, Config, Error as FailsafeError, StateMachine};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;

use super::{
    Authorization, GatewayError, InitializeRequest, PaymentGateway, RecipientRequest, Transfer,
    TransferRequest, Verification,
};

/// Every Paystack response is wrapped in this envelope.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    status: bool,
    #[serde(default)]
    message: String,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct Recipient {
    recipient_code: String,
}

/// HTTP client for the Paystack REST API
pub struct PaystackClient {
    client: Client,
    base_url: String,
    secret_key: String,
    circuit_breaker: StateMachine<failure_policy::ConsecutiveFailures<backoff::Exponential>, ()>,
}

impl PaystackClient {
    pub fn new(base_url: String, secret_key: String) -> Self {
        Self::with_circuit_breaker_config(base_url, secret_key, 5, Duration::from_secs(60))
    }

    pub fn with_circuit_breaker_config(
        base_url: String,
        secret_key: String,
        failure_threshold: u32,
        reset_timeout: Duration,
    ) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();

        let backoff = backoff::exponential(Duration::from_secs(10), reset_timeout);
        let policy = failure_policy::consecutive_failures(failure_threshold, backoff);
        let circuit_breaker = Config::new().failure_policy(policy).build();

        PaystackClient {
            client,
            base_url,
            secret_key,
            circuit_breaker,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    /// Sends the request through the circuit breaker and unwraps the envelope.
    /// Rejections by Paystack itself (`GatewayError::Api`) do not trip the breaker.
    async fn send<T>(&self, request: RequestBuilder) -> Result<T, GatewayError>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let request = request.bearer_auth(&self.secret_key);
        let result = self
            .circuit_breaker
            .call_with(
                |e: &GatewayError| !matches!(e, GatewayError::Api(_)),
                async move {
                    let response = request.send().await?;
                    let status = response.status();
                    let body = response.text().await?;
                    let envelope: Envelope<T> = serde_json::from_str(&body).map_err(|e| {
                        if status.is_success() {
                            GatewayError::InvalidResponse(e.to_string())
                        } else {
                            GatewayError::Api(format!("HTTP {}", status))
                        }
                    })?;

                    if !status.is_success() || !envelope.status {
                        return Err(GatewayError::Api(envelope.message));
                    }
                    envelope
                        .data
                        .ok_or_else(|| GatewayError::InvalidResponse("missing data".to_string()))
                },
            )
            .await;

        match result {
            Ok(data) => Ok(data),
            Err(FailsafeError::Rejected) => Err(GatewayError::CircuitBreakerOpen),
            Err(FailsafeError::Inner(e)) => Err(e),
        }
    }
}

#[async_trait]
impl PaymentGateway for PaystackClient {
    async fn initialize(&self, request: &InitializeRequest) -> Result<Authorization, GatewayError> {
        let builder = self
            .client
            .post(self.url("/transaction/initialize"))
            .json(request);
        self.send(builder).await
    }

    async fn verify(&self, reference: &str) -> Result<Verification, GatewayError> {
        let builder = self
            .client
            .get(self.url(&format!("/transaction/verify/{}", reference)));
        self.send(builder).await
    }

    async fn create_recipient(&self, request: &RecipientRequest) -> Result<String, GatewayError> {
        let builder = self.client.post(self.url("/transferrecipient")).json(request);
        let recipient: Recipient = self.send(builder).await?;
        Ok(recipient.recipient_code)
    }

    async fn initiate_transfer(&self, request: &TransferRequest) -> Result<Transfer, GatewayError> {
        let builder = self.client.post(self.url("/transfer")).json(request);
        self.send(builder).await
    }
}

impl Clone for PaystackClient {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
            secret_key: self.secret_key.clone(),
            circuit_breaker: self.circuit_breaker.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_joins_without_double_slash() {
        let client = PaystackClient::new("https://api.paystack.co/".to_string(), "sk".to_string());
        assert_eq!(
            client.url("/transaction/initialize"),
            "https://api.paystack.co/transaction/initialize"
        );
    }

    #[tokio::test]
    async fn test_verify_parses_envelope() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/transaction/verify/DEP-abc")
            .match_header("authorization", "Bearer sk_test")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"status":true,"message":"Verification successful","data":{
                    "status":"success","reference":"DEP-abc","amount":500000,
                    "channel":"card","paid_at":"2024-01-01T10:00:00Z",
                    "gateway_response":"Approved","currency":"NGN"}}"#,
            )
            .create_async()
            .await;

        let client = PaystackClient::new(server.url(), "sk_test".to_string());
        let verification = client.verify("DEP-abc").await.unwrap();
        assert_eq!(verification.status, "success");
        assert_eq!(verification.amount, 500_000);
        assert_eq!(verification.channel.as_deref(), Some("card"));
    }

    #[tokio::test]
    async fn test_api_error_carries_message() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/transferrecipient")
            .with_status(400)
            .with_header("content-type", "application/json")
            .with_body(r#"{"status":false,"message":"Account number is invalid"}"#)
            .create_async()
            .await;

        let client = PaystackClient::new(server.url(), "sk_test".to_string());
        let result = client
            .create_recipient(&RecipientRequest::nuban("Ada", "0000000000", "058"))
            .await;
        match result {
            Err(GatewayError::Api(message)) => assert_eq!(message, "Account number is invalid"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_circuit_opens_after_consecutive_failures() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", mockito::Matcher::Any)
            .with_status(200)
            .with_body("not json")
            .expect_at_least(2)
            .create_async()
            .await;

        let client = PaystackClient::with_circuit_breaker_config(
            server.url(),
            "sk_test".to_string(),
            2,
            Duration::from_secs(60),
        );
        for _ in 0..2 {
            assert!(matches!(
                client.verify("DEP-x").await,
                Err(GatewayError::InvalidResponse(_))
            ));
        }
        assert!(matches!(
            client.verify("DEP-x").await,
            Err(GatewayError::CircuitBreakerOpen)
        ));
    }
}
