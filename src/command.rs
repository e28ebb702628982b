//! Parser for `addtopic` chat commands.
//!
//! A command is a message starting with `/addtopic ` or `!addtopic `
//! (case-insensitive). Everything after the prefix, trimmed, is the topic.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::platform::ChatMessage;

/// Source tag attached to every command sent downstream.
pub const PLATFORM: &str = "PF";

const PREFIXES: [&str; 2] = ["/addtopic ", "!addtopic "];

/// Usernames at least this long are treated as wallet addresses.
const LONG_USERNAME: usize = 32;
/// How much of a long username is kept.
const USERNAME_TAIL: usize = 6;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicUser {
    pub id: String,
    pub username: String,
}

/// A topic request ready for the downstream API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    pub user: TopicUser,
    pub topic: String,
    pub platform: String,
    pub platform_data: Option<serde_json::Value>,
}

/// Parse a chat message into a [`Command`], or `None` if it isn't one.
///
/// The topic keeps the original casing; an empty topic is still a command.
pub fn parse(message: &ChatMessage) -> Option<Command> {
    info!("Parsing: {} - {}", message.username, message.text);

    let topic = strip_prefix(&message.text)?.trim();

    Some(Command {
        user: TopicUser {
            id: message.user_id.clone(),
            username: normalize_username(&message.username),
        },
        topic: topic.to_string(),
        platform: PLATFORM.to_string(),
        platform_data: None,
    })
}

fn strip_prefix(text: &str) -> Option<&str> {
    PREFIXES.iter().find_map(|prefix| {
        let head = text.get(..prefix.len())?;
        if head.eq_ignore_ascii_case(prefix) {
            Some(&text[prefix.len()..])
        } else {
            None
        }
    })
}

/// Shorten wallet-address usernames to their last few characters.
pub fn normalize_username(username: &str) -> String {
    let len = username.chars().count();
    if len >= LONG_USERNAME {
        username.chars().skip(len - USERNAME_TAIL).collect()
    } else {
        username.to_string()
    }
}
