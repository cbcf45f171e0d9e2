use super::{AlertEvent, Notifier};
use anyhow::{anyhow, Result};
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

const DEFAULT_SITE_URL: &str = "https://bandit.camp";

/// Discord webhook channel. Sends once; a failed post is returned to the caller.
#[derive(Clone)]
pub struct DiscordNotifier {
    webhook: String,
    client: Client,
    timeout: Duration,
    site_name: String,
    unit: String,
    cooldown_minutes: u64,
}

impl DiscordNotifier {
    pub fn new(webhook: String) -> Self {
        Self {
            webhook,
            client: Client::new(),
            timeout: Duration::from_secs(10),
            site_name: "BANDIT CAMP".to_string(),
            unit: "SCRAP".to_string(),
            cooldown_minutes: 25,
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    pub fn with_site_name(mut self, name: impl Into<String>) -> Self {
        self.site_name = name.into();
        self
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = unit.into();
        self
    }

    /// Only used in the message footer; the gate itself lives in the pipeline.
    pub fn with_cooldown_minutes(mut self, minutes: u64) -> Self {
        self.cooldown_minutes = minutes;
        self
    }

    pub(crate) fn render(&self, ev: &AlertEvent) -> String {
        let amount = match ev.amount {
            Some(v) => format!("{v:.2} {}", self.unit),
            None => format!("? {}", self.unit),
        };
        let url = if ev.url.trim().is_empty() {
            DEFAULT_SITE_URL
        } else {
            ev.url.as_str()
        };
        [
            format!("⚠️ **RAIN ON {}!** @everyone", self.site_name),
            format!("💰 Amount: **{amount}**"),
            format!("🔗 [GO TO SITE]({url})"),
            format!("⏰ Next alert available in: {} min.", self.cooldown_minutes),
        ]
        .join("\n")
    }
}

#[async_trait::async_trait]
impl Notifier for DiscordNotifier {
    async fn send(&self, ev: &AlertEvent) -> Result<()> {
        let payload = DiscordWebhookPayload::everyone(self.render(ev));

        let rsp = self
            .client
            .post(&self.webhook)
            .timeout(self.timeout)
            .json(&payload)
            .send()
            .await
            .map_err(|e| anyhow!("Discord webhook request failed: {e}"))?;

        rsp.error_for_status_ref()
            .map_err(|e| anyhow!("Discord webhook HTTP error: {e}"))?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "discord"
    }
}

#[derive(Serialize)]
struct AllowedMentions {
    parse: Vec<&'static str>,
}

#[derive(Serialize)]
struct DiscordWebhookPayload {
    content: String,
    allowed_mentions: AllowedMentions,
}

impl DiscordWebhookPayload {
    fn everyone(content: String) -> Self {
        Self {
            content,
            allowed_mentions: AllowedMentions {
                parse: vec!["everyone"],
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn ev(amount: Option<f64>, url: &str) -> AlertEvent {
        AlertEvent {
            amount,
            url: url.into(),
            text: "join now to get free scrap based on your play amount share 25".into(),
            observed_at: Utc::now(),
        }
    }

    #[test]
    fn message_has_amount_link_and_footer() {
        let n = DiscordNotifier::new("http://localhost/hook".into()).with_cooldown_minutes(25);
        let msg = n.render(&ev(Some(25.0), "https://bandit.camp/rain"));
        assert!(msg.contains("@everyone"));
        assert!(msg.contains("**25.00 SCRAP**"));
        assert!(msg.contains("(https://bandit.camp/rain)"));
        assert!(msg.contains("25 min."));
    }

    #[test]
    fn empty_url_falls_back_to_site() {
        let n = DiscordNotifier::new("http://localhost/hook".into()).with_unit("GEMS");
        let msg = n.render(&ev(None, " "));
        assert!(msg.contains("(https://bandit.camp)"));
        assert!(msg.contains("? GEMS"));
    }

    #[test]
    fn payload_allows_everyone_mention() {
        let json = serde_json::to_value(DiscordWebhookPayload::everyone("x".into())).unwrap();
        assert_eq!(json["allowed_mentions"]["parse"][0], "everyone");
        assert_eq!(json["content"], "x");
    }
}
