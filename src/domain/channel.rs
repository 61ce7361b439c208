//! Article channels (article types) and their per-channel rules.
//!
//! Closed set: adding a channel forces every `match` below (and the policy
//! table) to be revisited.

use super::entities::ContentType;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Social network reply variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SocialPost {
    TwitterStatus,
    TwitterDirectMessage,
    FacebookFeedComment,
}

/// The medium an article is sent through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum Channel {
    Note,
    Email,
    Phone,
    Sms,
    /// Telegram personal message.
    Messenger,
    SocialPost(SocialPost),
    /// Customer portal.
    Web,
}

/// Which addressing fields a channel requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Addressing {
    None,
    /// `to` required, no `cc`.
    To,
    /// `to` required, `cc` optional.
    ToCc,
}

/// How the content format of a channel is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentRule {
    /// Always this format, whatever the caller asked for.
    Fixed(ContentType),
    /// This format unless the caller picks another.
    Default(ContentType),
}

impl ContentRule {
    pub fn resolve(self, requested: Option<ContentType>) -> ContentType {
        match self {
            ContentRule::Fixed(ct) => ct,
            ContentRule::Default(ct) => requested.unwrap_or(ct),
        }
    }
}

/// Static metadata of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelSpec {
    pub addressing: Addressing,
    pub content: ContentRule,
    pub attachments_allowed: bool,
}

impl Channel {
    /// Every channel, in the order offered by the reply dialog.
    pub const ALL: [Channel; 9] = [
        Channel::Note,
        Channel::Email,
        Channel::Phone,
        Channel::Sms,
        Channel::Messenger,
        Channel::SocialPost(SocialPost::TwitterStatus),
        Channel::SocialPost(SocialPost::TwitterDirectMessage),
        Channel::SocialPost(SocialPost::FacebookFeedComment),
        Channel::Web,
    ];

    pub fn spec(self) -> ChannelSpec {
        use ContentType::{Html, Plain};
        let (addressing, content, attachments_allowed) = match self {
            Channel::Note => (Addressing::None, ContentRule::Fixed(Html), true),
            Channel::Email => (Addressing::ToCc, ContentRule::Default(Html), true),
            Channel::Phone => (Addressing::None, ContentRule::Fixed(Html), true),
            Channel::Sms => (Addressing::None, ContentRule::Fixed(Plain), false),
            Channel::Messenger => (Addressing::None, ContentRule::Fixed(Plain), true),
            Channel::SocialPost(SocialPost::TwitterDirectMessage) => {
                (Addressing::To, ContentRule::Fixed(Plain), false)
            }
            Channel::SocialPost(_) => (Addressing::None, ContentRule::Fixed(Plain), false),
            Channel::Web => (Addressing::None, ContentRule::Fixed(Html), true),
        };
        ChannelSpec {
            addressing,
            content,
            attachments_allowed,
        }
    }

    /// Persisted type name.
    pub fn name(self) -> &'static str {
        match self {
            Channel::Note => "note",
            Channel::Email => "email",
            Channel::Phone => "phone",
            Channel::Sms => "sms",
            Channel::Messenger => "telegram personal-message",
            Channel::SocialPost(SocialPost::TwitterStatus) => "twitter status",
            Channel::SocialPost(SocialPost::TwitterDirectMessage) => "twitter direct-message",
            Channel::SocialPost(SocialPost::FacebookFeedComment) => "facebook feed comment",
            Channel::Web => "web",
        }
    }

    /// Label shown in the reply dialog.
    pub fn label(self) -> &'static str {
        match self {
            Channel::Note => "Note",
            Channel::Email => "Email",
            Channel::Phone => "Phone",
            Channel::Sms => "Sms",
            Channel::Messenger => "Telegram",
            Channel::SocialPost(SocialPost::TwitterStatus) => "Twitter",
            Channel::SocialPost(SocialPost::TwitterDirectMessage) => "Twitter DM",
            Channel::SocialPost(SocialPost::FacebookFeedComment) => "Facebook",
            Channel::Web => "Web",
        }
    }

    /// Twitter replies are signed with the agent's initials.
    pub fn signs_with_initials(self) -> bool {
        matches!(
            self,
            Channel::SocialPost(SocialPost::TwitterStatus | SocialPost::TwitterDirectMessage)
        )
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown channel: {0}")]
pub struct UnknownChannel(pub String);

impl FromStr for Channel {
    type Err = UnknownChannel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim();
        Channel::ALL
            .into_iter()
            .find(|c| c.name().eq_ignore_ascii_case(needle))
            .ok_or_else(|| UnknownChannel(needle.to_string()))
    }
}

impl From<Channel> for String {
    fn from(c: Channel) -> Self {
        c.name().to_string()
    }
}

impl TryFrom<String> for Channel {
    type Error = UnknownChannel;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}
