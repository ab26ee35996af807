//! Posting the crash report to Slack.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::Config;
use crate::errors::NotifyError;

const POST_MESSAGE_URL: &str = "https://slack.com/api/chat.postMessage";

/// The line used when the dump never made it to object storage.
pub const UPLOAD_FAILED_LINE: &str = "Uploading to S3 failed!";

/// Compose the chat message: fixed crash header, dump name, download link
/// or failure notice, then the backtrace.
pub fn compose_message(dump_name: &str, url: Option<&str>, backtrace: &str) -> String {
    let download = match url {
        Some(url) => format!("Download from {url}"),
        None => UPLOAD_FAILED_LINE.to_string(),
    };
    format!("App Crash!\n{dump_name}\n{download}\n\nStack: \n{backtrace}")
}

/// Anything that can deliver a crash report. This is the seam the
/// pipeline tests use to avoid real chat traffic.
#[async_trait]
pub trait Notifier {
    async fn report(
        &self,
        dump_name: &str,
        url: Option<&str>,
        backtrace: &str,
    ) -> Result<(), NotifyError>;
}

#[derive(Serialize)]
struct PostMessage<'a> {
    channel: &'a str,
    text: &'a str,
    username: &'a str,
    icon_url: &'a str,
    unfurl_links: bool,
}

#[derive(Deserialize)]
struct PostMessageResponse {
    ok: bool,
    error: Option<String>,
}

/// Posts to a fixed channel under a fixed bot identity via the Slack Web
/// API. No retries; a failed post is the orchestrator's problem.
pub struct SlackNotifier {
    client: reqwest::Client,
    channel: String,
    token: String,
    username: String,
    icon_url: String,
}

impl SlackNotifier {
    pub fn new(config: &Config) -> SlackNotifier {
        SlackNotifier {
            client: reqwest::Client::new(),
            channel: config.chat_channel.clone(),
            token: config.chat_token.clone(),
            username: config.chat_username.clone(),
            icon_url: config.chat_icon_url.clone(),
        }
    }
}

#[async_trait]
impl Notifier for SlackNotifier {
    async fn report(
        &self,
        dump_name: &str,
        url: Option<&str>,
        backtrace: &str,
    ) -> Result<(), NotifyError> {
        let text = compose_message(dump_name, url, backtrace);
        let payload = PostMessage {
            channel: &self.channel,
            text: &text,
            username: &self.username,
            icon_url: &self.icon_url,
            unfurl_links: true,
        };
        let response = self
            .client
            .post(POST_MESSAGE_URL)
            .bearer_auth(&self.token)
            .json(&payload)
            .send()
            .await?
            .error_for_status()?;
        let body: PostMessageResponse = response.json().await?;
        if !body.ok {
            return Err(NotifyError::Api(
                body.error.unwrap_or_else(|| "unknown error".to_string()),
            ));
        }
        info!("posted crash report for {dump_name} to {}", self.channel);
        Ok(())
    }
}
