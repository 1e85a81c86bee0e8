//! Notification sending handler

use super::super::{CliContext, SendArgs};
use anyhow::{bail, Context, Result};
use apns_push::clients::AsyncApnsClient;
use apns_push::errors::token_prefix;
use apns_push::payload::Payload;
use apns_push::request::{ApnsRequest, NotificationOptions};
use serde_json::Value;
use tracing::debug;

/// Handler for `send`
pub struct SendHandler<'a> {
    context: &'a CliContext,
}

impl<'a> SendHandler<'a> {
    pub fn new(context: &'a CliContext) -> Self {
        Self { context }
    }

    pub async fn handle_send(&self, args: SendArgs) -> Result<()> {
        let mut config = args
            .credentials
            .apply(self.context.config_manager.config().apns.clone());
        if let Some(timeout) = args.timeout {
            config.timeout_secs = timeout;
        }
        if let Some(max_retries) = args.max_retries {
            config.max_retries = max_retries;
        }

        let payload = build_payload(&args);
        let options = build_options(&args);

        let client = AsyncApnsClient::new(config).context("Failed to create APNs client")?;
        debug!("Client configuration: {:?}", client.get_config_info());

        if args.dry_run {
            for token in &args.tokens {
                let request = client.preview_request(token, &payload, &options)?;
                print_request(&request)?;
            }
            return Ok(());
        }

        let result = if let [token] = args.tokens.as_slice() {
            self.send_single(&client, token, &payload, &options).await
        } else {
            self.send_bulk(&client, &args.tokens, &payload, &options).await
        };

        client.close();
        result
    }

    async fn send_single(
        &self,
        client: &AsyncApnsClient,
        token: &str,
        payload: &Payload,
        options: &NotificationOptions,
    ) -> Result<()> {
        client
            .send_notification(token, payload, options)
            .await
            .with_context(|| format!("Failed to deliver notification to {}", token_prefix(token)))?;

        println!("Notification delivered to {}", token_prefix(token));
        Ok(())
    }

    async fn send_bulk(
        &self,
        client: &AsyncApnsClient,
        tokens: &[String],
        payload: &Payload,
        options: &NotificationOptions,
    ) -> Result<()> {
        let results = client
            .send_bulk_notifications(tokens, payload, options)
            .await;

        println!("{:<14} STATUS", "TOKEN");
        let mut failed = 0;
        for token in tokens {
            let delivered = results.get(token).copied().unwrap_or(false);
            if !delivered {
                failed += 1;
            }
            println!(
                "{:<14} {}",
                token_prefix(token),
                if delivered { "delivered" } else { "failed" }
            );
        }

        let stats = client.get_stats();
        println!(
            "\n{} delivered, {} failed ({:.1}% success)",
            stats.notifications_sent,
            stats.notifications_failed,
            stats.success_rate()
        );

        if failed > 0 {
            bail!("{failed} of {} notifications failed", tokens.len());
        }
        Ok(())
    }
}

fn build_payload(args: &SendArgs) -> Payload {
    let mut payload = Payload::default().set_content_available(args.content_available);

    if let Some(title) = &args.title {
        payload = payload.set_title(title.clone());
    }
    if let Some(subtitle) = &args.subtitle {
        payload = payload.set_subtitle(subtitle.clone());
    }
    if let Some(body) = &args.body {
        payload = payload.set_body(body.clone());
    }
    if let Some(sound) = &args.sound {
        payload = payload.set_sound(sound.clone());
    }
    if let Some(badge) = args.badge {
        payload = payload.set_badge(badge);
    }

    for (key, value) in &args.data {
        // Numbers, booleans and JSON documents keep their type.
        let value = serde_json::from_str::<Value>(value).unwrap_or_else(|_| Value::from(value.as_str()));
        payload = payload.add_custom_data(key.clone(), value);
    }

    payload
}

fn build_options(args: &SendArgs) -> NotificationOptions {
    let mut options = NotificationOptions::new()
        .with_push_type(args.push_type)
        .with_priority(args.priority);

    if let Some(expiration) = args.expiration {
        options = options.with_expiration(expiration);
    }
    if let Some(collapse_id) = &args.collapse_id {
        options = options.with_collapse_id(collapse_id.clone());
    }

    options
}

fn print_request(request: &ApnsRequest) -> Result<()> {
    println!("POST {}", request.url);

    let mut headers: Vec<(&str, &str)> = request
        .headers
        .iter()
        .map(|(name, value)| (name.as_str(), value.to_str().unwrap_or("<binary>")))
        .collect();
    headers.sort();

    for (name, value) in headers {
        if name == "authorization" {
            println!("{name}: bearer <redacted>");
        } else {
            println!("{name}: {value}");
        }
    }

    println!();
    println!("{}", serde_json::to_string_pretty(&request.body)?);
    println!();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Commands};
    use clap::Parser;

    fn send_args(extra: &[&str]) -> SendArgs {
        let mut argv = vec!["apns-push", "send", "abcdef"];
        argv.extend_from_slice(extra);
        match Cli::try_parse_from(argv).unwrap().command {
            Commands::Send(args) => args,
            _ => panic!("expected send command"),
        }
    }

    #[test]
    fn test_payload_from_arguments() {
        let args = send_args(&[
            "--title", "Order shipped",
            "--body", "Arrives Tuesday",
            "--badge", "2",
            "-d", "order_id=1234",
            "-d", "tracking=ZX-99",
            "-d", "meta={\"gift\":true}",
        ]);

        let body = apns_push::NotificationPayload::to_json(&build_payload(&args)).unwrap();
        assert_eq!(body["aps"]["alert"]["title"], "Order shipped");
        assert_eq!(body["aps"]["alert"]["body"], "Arrives Tuesday");
        assert_eq!(body["aps"]["badge"], 2);
        assert_eq!(body["order_id"], 1234);
        assert_eq!(body["tracking"], "ZX-99");
        assert_eq!(body["meta"]["gift"], true);
    }

    #[test]
    fn test_background_payload() {
        let args = send_args(&["--content-available", "--push-type", "background", "--priority", "5"]);

        let body = apns_push::NotificationPayload::to_json(&build_payload(&args)).unwrap();
        assert_eq!(body["aps"]["content-available"], 1);
        assert!(body["aps"].get("alert").is_none());

        let options = build_options(&args);
        assert_eq!(options.push_type.as_str(), "background");
        assert_eq!(options.priority.0, 5);
    }

    #[test]
    fn test_options_from_arguments() {
        let args = send_args(&["--expiration", "1700000000", "--collapse-id", "scores"]);
        let options = build_options(&args);

        assert_eq!(options.expiration, Some(1_700_000_000));
        assert_eq!(options.collapse_id.as_deref(), Some("scores"));
        assert_eq!(options.priority.0, 10);
    }
}
