//! SMS delivery through the Twilio REST API.

use crate::dispatcher::SmsGateway;
use crate::error::AlertError;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

const TWILIO_API: &str = "https://api.twilio.com";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Deserialize)]
struct MessageResponse {
    sid: String,
}

pub struct TwilioSms {
    client: reqwest::Client,
    account_sid: String,
    auth_token: String,
    from: String,
}

impl TwilioSms {
    pub fn new(
        account_sid: impl Into<String>,
        auth_token: impl Into<String>,
        from: impl Into<String>,
    ) -> Result<Self, AlertError> {
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            account_sid: account_sid.into(),
            auth_token: auth_token.into(),
            from: from.into(),
        })
    }

    fn messages_url(&self) -> String {
        format!("{TWILIO_API}/2010-04-01/Accounts/{}/Messages.json", self.account_sid)
    }

    fn form<'a>(&'a self, to: &'a str, body: &'a str) -> [(&'static str, &'a str); 3] {
        [("To", to), ("From", &self.from), ("Body", body)]
    }
}

#[async_trait]
impl SmsGateway for TwilioSms {
    async fn send(&self, to: &str, body: &str) -> Result<String, AlertError> {
        let response = self
            .client
            .post(self.messages_url())
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&self.form(to, body))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AlertError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let message: MessageResponse = response.json().await?;
        Ok(message.sid)
    }
}
