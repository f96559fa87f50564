use crate::alerts::{AlertProperty, SavedSearch};
use crate::config::NotificationConfig;
use crate::runner::CityReport;
use anyhow::{Context, Result};
use chrono::Utc;
use reqwest::Client;
use serde_json::json;
use std::time::Duration;
use tracing::{error, info, warn};

pub mod format;

use format::Channel;

/// Delivers alerts over Telegram and SendGrid email
pub struct Notifier {
    client: Client,
    config: NotificationConfig,
}

impl Notifier {
    pub fn new(config: NotificationConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self { client, config })
    }

    pub fn telegram_enabled(&self) -> bool {
        self.config.telegram_bot_token.is_some()
    }

    /// Send an HTML-formatted Telegram message; false if unconfigured or failed
    pub async fn send_telegram(&self, chat_id: &str, text: &str) -> bool {
        let Some(token) = &self.config.telegram_bot_token else {
            warn!("Telegram token not configured");
            return false;
        };

        let url = format!(
            "{}/bot{}/sendMessage",
            self.config.telegram_api_base.trim_end_matches('/'),
            token
        );
        let payload = json!({
            "chat_id": chat_id,
            "text": text,
            "parse_mode": "HTML",
            "disable_web_page_preview": false,
        });

        let result = self
            .client
            .post(&url)
            .json(&payload)
            .send()
            .await
            .and_then(|r| r.error_for_status());
        match result {
            Ok(_) => true,
            Err(e) => {
                // The URL carries the bot token
                error!("Error sending Telegram message: {}", e.without_url());
                false
            }
        }
    }

    /// Send an HTML email through SendGrid; false if unconfigured or rejected
    pub async fn send_email(&self, to: &str, subject: &str, html: &str) -> bool {
        let Some(key) = &self.config.sendgrid_api_key else {
            warn!("SendGrid API key not configured");
            return false;
        };

        let url = format!(
            "{}/v3/mail/send",
            self.config.sendgrid_api_base.trim_end_matches('/')
        );
        let payload = json!({
            "personalizations": [{ "to": [{ "email": to }] }],
            "from": { "email": self.config.email_from },
            "subject": subject,
            "content": [{ "type": "text/html", "value": html }],
        });

        match self.client.post(&url).bearer_auth(key).json(&payload).send().await {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                error!("SendGrid error: {} - {}", status, body);
                false
            }
            Err(e) => {
                error!("Error sending email: {}", e);
                false
            }
        }
    }

    /// One property to every channel the search has enabled
    pub async fn send_property_alert(&self, search: &SavedSearch, property: &AlertProperty) -> bool {
        let mut success = true;

        if let (true, Some(chat_id)) = (search.wants_telegram(), &search.telegram_chat_id) {
            let message = format::property_message(property, Channel::Telegram);
            success &= self.send_telegram(chat_id, &message).await;
        }
        if let (true, Some(email)) = (search.wants_email(), &search.email) {
            let html = format::property_message(property, Channel::Email);
            success &= self
                .send_email(email, &format::alert_subject(property), &html)
                .await;
        }
        success
    }

    pub async fn send_new_deals_digest(
        &self,
        search: &SavedSearch,
        properties: &[AlertProperty],
    ) -> bool {
        if properties.is_empty() {
            return true;
        }
        let mut success = true;

        if let (true, Some(email)) = (search.wants_email(), &search.email) {
            let html = format::email_digest(properties, &self.config.site_url);
            success &= self
                .send_email(email, &format::digest_subject(properties.len()), &html)
                .await;
        }
        if let (true, Some(chat_id)) = (search.wants_telegram(), &search.telegram_chat_id) {
            let message = format::telegram_digest(properties);
            success &= self.send_telegram(chat_id, &message).await;
        }
        success
    }

    pub async fn send_price_drop_alert(
        &self,
        search: &SavedSearch,
        property: &AlertProperty,
        old_price: f64,
        new_price: f64,
    ) -> bool {
        let mut success = true;

        if let (true, Some(chat_id)) = (search.wants_telegram(), &search.telegram_chat_id) {
            let message = format::price_drop_message(property, old_price, new_price, Channel::Telegram);
            success &= self.send_telegram(chat_id, &message).await;
        }
        if let (true, Some(email)) = (search.wants_email(), &search.email) {
            let html = format::price_drop_message(property, old_price, new_price, Channel::Email);
            success &= self
                .send_email(email, &format::price_drop_subject(old_price, new_price), &html)
                .await;
        }
        success
    }

    /// Log the run summary and forward it to the admin chat when configured
    pub async fn send_scrape_summary(&self, reports: &[CityReport]) -> bool {
        let message = format::scrape_summary(reports, Utc::now());
        info!("{}", message);

        match &self.config.admin_chat_id {
            Some(chat_id) if self.telegram_enabled() => self.send_telegram(chat_id, &message).await,
            _ => true,
        }
    }
}
