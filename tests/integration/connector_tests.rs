//! Integration tests for the console connector.
//!
//! Validates:
//! - Replies are assembled from the prompt and image markers extracted
//! - Slash commands act on the pool
//! - Rate limiting and connection failures produce user-facing text
//! - Per-channel queues keep message order

use std::time::Duration;

use agent_switchboard::connector::queue::ChannelQueues;
use agent_switchboard::connector::{handle_message, InboundMessage};
use tokio::sync::mpsc;

use super::test_helpers::{test_pool, test_settings, FakeAgent};

fn message(channel: &str, text: &str) -> InboundMessage {
    InboundMessage {
        channel_key: channel.to_owned(),
        user: "alice".to_owned(),
        text: text.to_owned(),
    }
}

#[tokio::test]
async fn reply_strips_and_collects_image_markers() {
    let root = tempfile::tempdir().unwrap();
    let (pool, _launcher, _rx) = test_pool(test_settings(root.path()), FakeAgent::echo());

    let reply = handle_message(&pool, message("A", "look [[image:/tmp/plot.png]]")).await;
    assert_eq!(reply.channel_key, "A");
    assert_eq!(reply.text, "echo: look");
    assert_eq!(reply.images, vec!["/tmp/plot.png".to_owned()]);

    let status = pool.status("A").await.unwrap();
    assert_eq!(status.message_count, 1);
    assert!(status.input_chars > 0);
}

#[tokio::test]
async fn clear_command_drops_the_session() {
    let root = tempfile::tempdir().unwrap();
    let (pool, launcher, _rx) = test_pool(test_settings(root.path()), FakeAgent::echo());

    handle_message(&pool, message("A", "hello")).await;
    let cleared = handle_message(&pool, message("A", "/clear")).await;
    assert!(cleared.text.starts_with("Session cleared"));
    assert!(pool.channel_keys().await.is_empty());

    let again = handle_message(&pool, message("A", "/clear")).await;
    assert_eq!(again.text, "No active session to clear.");

    handle_message(&pool, message("A", "hello again")).await;
    assert_eq!(launcher.launches(), 2);
}

#[tokio::test]
async fn status_and_help_commands() {
    let root = tempfile::tempdir().unwrap();
    let (pool, _launcher, _rx) = test_pool(test_settings(root.path()), FakeAgent::echo());

    let none = handle_message(&pool, message("A", "/status")).await;
    assert!(none.text.starts_with("No active session"));

    handle_message(&pool, message("A", "hi")).await;
    let status = handle_message(&pool, message("A", "/status")).await;
    assert!(status.text.contains("Session: sess-1"), "got {}", status.text);
    assert!(status.text.contains("Messages: 1"));

    let help = handle_message(&pool, message("A", "/help")).await;
    assert!(help.text.contains("/clear"));
}

#[tokio::test]
async fn rate_limited_message_is_refused_without_prompting() {
    let root = tempfile::tempdir().unwrap();
    let mut settings = test_settings(root.path());
    settings.rate_limit = Duration::from_secs(60);
    let agent = FakeAgent::echo();
    let (pool, _launcher, _rx) = test_pool(settings, agent.clone());

    let first = handle_message(&pool, message("A", "one")).await;
    assert_eq!(first.text, "echo: one");

    let second = handle_message(&pool, message("A", "two")).await;
    assert!(second.text.contains("too quickly"));
    assert_eq!(
        agent.methods().iter().filter(|m| *m == "session/prompt").count(),
        1
    );

    let reset = handle_message(&pool, message("A", "/reset")).await;
    assert!(reset.text.starts_with("Session cleared"));
    let third = handle_message(&pool, message("A", "three")).await;
    assert_eq!(third.text, "echo: three");
}

#[tokio::test]
async fn connection_failure_is_reported() {
    let root = tempfile::tempdir().unwrap();
    let mut agent = FakeAgent::echo();
    agent.fail_initialize = true;
    let (pool, _launcher, _rx) = test_pool(test_settings(root.path()), agent);

    let reply = handle_message(&pool, message("A", "hello")).await;
    assert_eq!(reply.text, "Could not connect to the agent. Please try again later.");
    assert!(!reply.text.contains("unsupported version"));
    assert!(!reply.text.contains("initialize"));
    assert!(reply.images.is_empty());
}

#[tokio::test]
async fn queued_messages_keep_channel_order() {
    let root = tempfile::tempdir().unwrap();
    let (pool, _launcher, _rx) = test_pool(test_settings(root.path()), FakeAgent::echo());
    let (replies_tx, mut replies_rx) = mpsc::unbounded_channel();
    let queues = ChannelQueues::new(pool, replies_tx);

    for text in ["one", "two", "three"] {
        queues.dispatch(message("A", text)).await;
    }
    queues.dispatch(message("B", "other")).await;
    assert_eq!(queues.active_channels().await, 2);

    let mut a_replies = Vec::new();
    let mut b_replies = Vec::new();
    for _ in 0..4 {
        let reply = tokio::time::timeout(Duration::from_secs(5), replies_rx.recv())
            .await
            .unwrap()
            .unwrap();
        if reply.channel_key == "A" {
            a_replies.push(reply.text);
        } else {
            b_replies.push(reply.text);
        }
    }
    assert_eq!(a_replies, vec!["echo: one", "echo: two", "echo: three"]);
    assert_eq!(b_replies, vec!["echo: other"]);
}
