use serde::Serialize;

use crate::validators::is_valid_email;

/// Client for the JSON mail relay. Cheap to clone; the inner reqwest client
/// is shared.
#[derive(Clone)]
pub struct EmailClient {
    http_client: reqwest::Client,
    base_url: String,
    sender: SenderAddress,
}

/// A validated sender address.
#[derive(Clone)]
pub struct SenderAddress(String);

impl SenderAddress {
    pub fn parse(s: String) -> Result<Self, String> {
        let email = is_valid_email(&s).map_err(|e| format!("{:?}", e))?;
        Ok(Self(email))
    }

    pub fn inner(&self) -> &str {
        &self.0
    }
}

#[derive(Serialize)]
struct SendEmailRequest {
    from: String,
    to: String,
    #[serde(rename = "Subject")]
    subject: String,
    #[serde(rename = "Html")]
    html: String,
}

impl EmailClient {
    pub fn new(base_url: String, sender: SenderAddress, http_client: reqwest::Client) -> Self {
        Self {
            http_client,
            base_url,
            sender,
        }
    }

    pub async fn send_email(
        &self,
        recipient: &str,
        subject: &str,
        html_content: &str,
    ) -> Result<(), String> {
        let url = format!("{}/email", self.base_url);
        let request = SendEmailRequest {
            from: self.sender.inner().to_string(),
            to: recipient.to_string(),
            subject: subject.to_string(),
            html: html_content.to_string(),
        };

        self.http_client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                tracing::error!("Failed to send email: {}", e);
                format!("Failed to send email: {}", e)
            })?
            .error_for_status()
            .map_err(|e| {
                tracing::error!("Email service returned error: {}", e);
                format!("Email service error: {}", e)
            })?;

        Ok(())
    }
}
