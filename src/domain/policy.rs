//! Role × channel defaulting table.
//!
//! Policy data only; validation lives in `intake`.

use super::channel::Channel;
use super::entities::{Role, Sender, Visibility};

/// Defaults applied to an article before validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Defaults {
    pub visibility: Visibility,
    pub sender: Sender,
    /// Whether the actor may pick the other visibility.
    pub visibility_overridable: bool,
}

const AGENT_INTERNAL: Defaults = Defaults {
    visibility: Visibility::Internal,
    sender: Sender::Agent,
    visibility_overridable: true,
};

const AGENT_PUBLIC: Defaults = Defaults {
    visibility: Visibility::Public,
    sender: Sender::Agent,
    visibility_overridable: true,
};

const CUSTOMER_WEB: Defaults = Defaults {
    visibility: Visibility::Public,
    sender: Sender::Customer,
    visibility_overridable: false,
};

/// Channel used when the request does not name one.
pub fn default_channel(role: Role) -> Channel {
    match role {
        Role::Agent => Channel::Note,
        Role::Customer => Channel::Web,
    }
}

/// Defaults for `role` writing on `channel`. `None` = the role may not use the channel.
pub fn defaults(role: Role, channel: Channel) -> Option<Defaults> {
    match (role, channel) {
        (Role::Agent, Channel::Note) => Some(AGENT_INTERNAL),
        (Role::Agent, Channel::Email) => Some(AGENT_PUBLIC),
        (
            Role::Agent,
            Channel::Phone | Channel::Sms | Channel::Messenger | Channel::SocialPost(_),
        ) => Some(AGENT_PUBLIC),
        (Role::Agent, Channel::Web) => None,
        (Role::Customer, Channel::Web) => Some(CUSTOMER_WEB),
        (Role::Customer, _) => None,
    }
}

/// Whether a ticket that came in through `origin` can be answered on `channel`.
///
/// Note, Email, Phone and Web are always there. Sms, Telegram and the social
/// reply types only answer a conversation that started on that same channel.
pub fn offered_on(channel: Channel, origin: Option<Channel>) -> bool {
    match channel {
        Channel::Note | Channel::Email | Channel::Phone | Channel::Web => true,
        Channel::Sms | Channel::Messenger | Channel::SocialPost(_) => origin == Some(channel),
    }
}

/// Channels `role` may write on for a ticket from `origin`, in dialog order.
pub fn allowed_channels(role: Role, origin: Option<Channel>) -> Vec<Channel> {
    Channel::ALL
        .into_iter()
        .filter(|c| defaults(role, *c).is_some() && offered_on(*c, origin))
        .collect()
}
