//! Article intake: resolve channel and defaults, validate, compose the body.
//!
//! Pure function over already-loaded data. The caller looks up the group's
//! active signature and persists the result.

use super::body;
use super::channel::{Addressing, Channel};
use super::entities::{
    Actor, ArticleRequest, ContentType, NewArticle, Role, Signature, Ticket,
};
use super::errors::ValidationError;
use super::policy::{self, Defaults};
use super::signature;

/// Validate and default `request` for `actor` on `ticket`.
///
/// `signature` is the ticket group's active signature, if any; it is only
/// applied to formatted-text email written by an agent.
pub fn prepare(
    actor: &Actor,
    ticket: &Ticket,
    request: &ArticleRequest,
    signature: Option<&Signature>,
) -> Result<NewArticle, ValidationError> {
    let (channel, defaults) = resolve_channel(actor.role, request.channel, ticket.origin)?;

    let visibility = if defaults.visibility_overridable {
        request.visibility.unwrap_or(defaults.visibility)
    } else {
        defaults.visibility
    };
    let spec = channel.spec();
    let content_type = spec.content.resolve(request.content_type);

    if request.body.trim().is_empty() {
        return Err(ValidationError::EmptyBody);
    }

    let (to, cc) = match spec.addressing {
        Addressing::To => {
            let to = non_blank(request.to.as_deref())
                .ok_or(ValidationError::MissingAddress { field: "to" })?;
            (Some(to), None)
        }
        Addressing::ToCc => {
            let to = non_blank(request.to.as_deref())
                .ok_or(ValidationError::MissingAddress { field: "to" })?;
            (Some(to), non_blank(request.cc.as_deref()))
        }
        Addressing::None => (None, None),
    };

    if !request.attachments.is_empty() && !spec.attachments_allowed {
        return Err(ValidationError::AttachmentNotAllowed { channel });
    }

    let body = compose_body(actor, channel, content_type, &request.body, signature);

    Ok(NewArticle {
        ticket_id: ticket.id,
        channel,
        visibility,
        sender: defaults.sender,
        content_type,
        body,
        to,
        cc,
        attachments: request.attachments.clone(),
        created_by: actor.id,
    })
}

/// Requested channel (or the role's default) with its policy row. Customers are pinned to Web;
/// conditional channels need a ticket that came in on them.
fn resolve_channel(
    role: Role,
    requested: Option<Channel>,
    origin: Option<Channel>,
) -> Result<(Channel, Defaults), ValidationError> {
    let channel = requested.unwrap_or_else(|| policy::default_channel(role));
    let defaults = policy::defaults(role, channel)
        .filter(|_| policy::offered_on(channel, origin))
        .ok_or(ValidationError::ForbiddenChannel { role, channel })?;
    Ok((channel, defaults))
}

fn compose_body(
    actor: &Actor,
    channel: Channel,
    content_type: ContentType,
    text: &str,
    signature: Option<&Signature>,
) -> String {
    match content_type {
        ContentType::Html => {
            let html = body::to_html(text);
            match signature {
                Some(sig)
                    if sig.active && channel == Channel::Email && actor.role == Role::Agent =>
                {
                    signature::append(&html, sig, actor)
                }
                _ => html,
            }
        }
        ContentType::Plain => {
            let plain = body::to_plain(text);
            if channel.signs_with_initials() && actor.role == Role::Agent {
                format!("{}\n/{}", plain, actor.initials())
            } else {
                plain
            }
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::channel::SocialPost;
    use crate::domain::entities::{AttachmentRef, Sender, Visibility};

    fn agent() -> Actor {
        Actor {
            id: 10,
            role: Role::Agent,
            firstname: "Agent".into(),
            lastname: "Smith".into(),
            email: Some("agent@example.com".into()),
        }
    }

    fn customer() -> Actor {
        Actor {
            id: 20,
            role: Role::Customer,
            firstname: "Nicole".into(),
            lastname: "Braun".into(),
            email: Some("nicole@example.com".into()),
        }
    }

    fn ticket() -> Ticket {
        Ticket {
            id: 1,
            title: "Welcome".into(),
            group_id: 1,
            customer_id: 20,
            owner_id: Some(10),
            origin: None,
        }
    }

    fn ticket_from(origin: Channel) -> Ticket {
        Ticket {
            origin: Some(origin),
            ..ticket()
        }
    }

    fn signature() -> Signature {
        Signature {
            id: 4,
            name: "sig".into(),
            body: "#{user.firstname}<br>Signature!".into(),
            active: true,
        }
    }

    fn attachment() -> AttachmentRef {
        AttachmentRef {
            store_key: "1/a.png".into(),
            filename: "a.png".into(),
            mime_type: "image/png".into(),
            size: 3,
        }
    }

    #[test]
    fn test_agent_note_defaults_internal() {
        let a = prepare(&agent(), &ticket(), &ArticleRequest::with_body("This is a note"), None)
            .unwrap();
        assert_eq!(a.channel, Channel::Note);
        assert_eq!(a.visibility, Visibility::Internal);
        assert_eq!(a.sender, Sender::Agent);
        assert_eq!(a.content_type, ContentType::Html);
        assert_eq!(a.body, "<p>This is a note</p>");
        assert_eq!(a.created_by, 10);
    }

    #[test]
    fn test_agent_public_note_override() {
        let req = ArticleRequest::with_body("This is a note!").visibility(Visibility::Public);
        let a = prepare(&agent(), &ticket(), &req, None).unwrap();
        assert_eq!(a.visibility, Visibility::Public);
        assert_eq!(a.body, "<p>This is a note!</p>");
    }

    #[test]
    fn test_agent_email_public_with_signature() {
        let req = ArticleRequest::with_body("This is a note!")
            .channel(Channel::Email)
            .to("to@example.com")
            .cc("cc@example.com");
        let a = prepare(&agent(), &ticket(), &req, Some(&signature())).unwrap();
        assert_eq!(a.visibility, Visibility::Public);
        assert_eq!(a.to.as_deref(), Some("to@example.com"));
        assert_eq!(a.cc.as_deref(), Some("cc@example.com"));
        assert_eq!(
            a.body,
            "<p>This is a note!</p><p><br></p><div data-signature=\"true\" data-signature-id=\"4\"><p>Agent<br>Signature!</p></div>"
        );
    }

    #[test]
    fn test_agent_internal_email_keeps_signature() {
        let req = ArticleRequest::with_body("x")
            .channel(Channel::Email)
            .to("a@b.c")
            .visibility(Visibility::Internal);
        let a = prepare(&agent(), &ticket(), &req, Some(&signature())).unwrap();
        assert_eq!(a.visibility, Visibility::Internal);
        assert_eq!(signature::find_signature_id(&a.body), Some(4));
    }

    #[test]
    fn test_plain_email_skips_signature() {
        let req = ArticleRequest::with_body("x")
            .channel(Channel::Email)
            .to("a@b.c")
            .content_type(ContentType::Plain);
        let a = prepare(&agent(), &ticket(), &req, Some(&signature())).unwrap();
        assert_eq!(a.content_type, ContentType::Plain);
        assert_eq!(a.body, "x");
    }

    #[test]
    fn test_inactive_signature_ignored() {
        let sig = Signature {
            active: false,
            ..signature()
        };
        let req = ArticleRequest::with_body("x").channel(Channel::Email).to("a@b.c");
        let a = prepare(&agent(), &ticket(), &req, Some(&sig)).unwrap();
        assert_eq!(a.body, "<p>x</p>");
    }

    #[test]
    fn test_note_never_gets_signature() {
        let a = prepare(&agent(), &ticket(), &ArticleRequest::with_body("x"), Some(&signature()))
            .unwrap();
        assert_eq!(a.body, "<p>x</p>");
    }

    #[test]
    fn test_email_requires_to() {
        let req = ArticleRequest::with_body("x").channel(Channel::Email);
        assert_eq!(
            prepare(&agent(), &ticket(), &req, None),
            Err(ValidationError::MissingAddress { field: "to" })
        );
        let blank = req.clone().to("   ");
        assert_eq!(
            prepare(&agent(), &ticket(), &blank, None),
            Err(ValidationError::MissingAddress { field: "to" })
        );
    }

    #[test]
    fn test_empty_body_rejected_first() {
        let req = ArticleRequest::with_body(" \n ").channel(Channel::Email);
        assert_eq!(
            prepare(&agent(), &ticket(), &req, None),
            Err(ValidationError::EmptyBody)
        );
    }

    #[test]
    fn test_customer_forced_web_public() {
        let req = ArticleRequest::with_body("This is a note").visibility(Visibility::Internal);
        let a = prepare(&customer(), &ticket(), &req, Some(&signature())).unwrap();
        assert_eq!(a.channel, Channel::Web);
        assert_eq!(a.visibility, Visibility::Public);
        assert_eq!(a.sender, Sender::Customer);
        assert_eq!(a.content_type, ContentType::Html);
        assert_eq!(a.body, "<p>This is a note</p>");
    }

    #[test]
    fn test_customer_email_forbidden() {
        let req = ArticleRequest::with_body("x").channel(Channel::Email).to("a@b.c");
        assert_eq!(
            prepare(&customer(), &ticket(), &req, None),
            Err(ValidationError::ForbiddenChannel {
                role: Role::Customer,
                channel: Channel::Email
            })
        );
    }

    #[test]
    fn test_agent_web_forbidden() {
        let req = ArticleRequest::with_body("x").channel(Channel::Web);
        assert!(matches!(
            prepare(&agent(), &ticket(), &req, None),
            Err(ValidationError::ForbiddenChannel { .. })
        ));
    }

    #[test]
    fn test_plain_channels_ignore_html_request() {
        for channel in [
            Channel::Sms,
            Channel::Messenger,
            Channel::SocialPost(SocialPost::FacebookFeedComment),
        ] {
            let req = ArticleRequest::with_body("hello <world>")
                .channel(channel)
                .content_type(ContentType::Html);
            let a = prepare(&agent(), &ticket_from(channel), &req, None).unwrap();
            assert_eq!(a.content_type, ContentType::Plain, "{channel}");
            assert_eq!(a.body, "hello <world>");
            assert_eq!(a.visibility, Visibility::Public);
        }
    }

    #[test]
    fn test_phone_is_html_and_allows_attachments() {
        let req = ArticleRequest::with_body("called back")
            .channel(Channel::Phone)
            .content_type(ContentType::Plain)
            .attachment(attachment());
        let a = prepare(&agent(), &ticket(), &req, None).unwrap();
        assert_eq!(a.content_type, ContentType::Html);
        assert_eq!(a.attachments.len(), 1);
    }

    #[test]
    fn test_phone_visibility_override_permitted() {
        let req = ArticleRequest::with_body("x")
            .channel(Channel::Phone)
            .visibility(Visibility::Internal);
        let a = prepare(&agent(), &ticket(), &req, None).unwrap();
        assert_eq!(a.visibility, Visibility::Internal);
    }

    #[test]
    fn test_twitter_signed_with_initials() {
        let channel = Channel::SocialPost(SocialPost::TwitterStatus);
        let req = ArticleRequest::with_body("Thanks!").channel(channel);
        let a = prepare(&agent(), &ticket_from(channel), &req, None).unwrap();
        assert_eq!(a.body, "Thanks!\n/AS");
        assert_eq!(a.to, None);
    }

    #[test]
    fn test_twitter_dm_keeps_recipient() {
        let channel = Channel::SocialPost(SocialPost::TwitterDirectMessage);
        let req = ArticleRequest::with_body("Thanks!")
            .channel(channel)
            .to(" @customer ")
            .cc("@someone");
        let a = prepare(&agent(), &ticket_from(channel), &req, None).unwrap();
        assert_eq!(a.to.as_deref(), Some("@customer"));
        assert_eq!(a.cc, None);
        assert_eq!(a.body, "Thanks!\n/AS");

        let without = ArticleRequest::with_body("Thanks!").channel(channel);
        assert_eq!(
            prepare(&agent(), &ticket_from(channel), &without, None),
            Err(ValidationError::MissingAddress { field: "to" })
        );
    }

    #[test]
    fn test_conditional_channel_needs_matching_origin() {
        for channel in [
            Channel::Sms,
            Channel::Messenger,
            Channel::SocialPost(SocialPost::TwitterStatus),
            Channel::SocialPost(SocialPost::FacebookFeedComment),
        ] {
            let req = ArticleRequest::with_body("x").channel(channel);
            assert_eq!(
                prepare(&agent(), &ticket(), &req, None),
                Err(ValidationError::ForbiddenChannel {
                    role: Role::Agent,
                    channel
                }),
                "{channel}"
            );
            assert_eq!(
                prepare(&agent(), &ticket_from(Channel::Email), &req, None),
                Err(ValidationError::ForbiddenChannel {
                    role: Role::Agent,
                    channel
                }),
                "{channel}"
            );
        }
        let phone = ArticleRequest::with_body("x").channel(Channel::Phone);
        assert!(prepare(&agent(), &ticket(), &phone, None).is_ok());
    }

    #[test]
    fn test_attachments_rejected_on_social_and_sms() {
        for channel in [
            Channel::Sms,
            Channel::SocialPost(SocialPost::TwitterStatus),
            Channel::SocialPost(SocialPost::FacebookFeedComment),
        ] {
            let req = ArticleRequest::with_body("x")
                .channel(channel)
                .attachment(attachment());
            assert_eq!(
                prepare(&agent(), &ticket_from(channel), &req, None),
                Err(ValidationError::AttachmentNotAllowed { channel })
            );
        }
    }

    #[test]
    fn test_addressing_dropped_on_note() {
        let req = ArticleRequest::with_body("x").to("a@b.c").cc("d@e.f");
        let a = prepare(&agent(), &ticket(), &req, None).unwrap();
        assert_eq!(a.to, None);
        assert_eq!(a.cc, None);
    }

    #[test]
    fn test_blank_cc_dropped() {
        let req = ArticleRequest::with_body("x")
            .channel(Channel::Email)
            .to(" a@b.c ")
            .cc(" ");
        let a = prepare(&agent(), &ticket(), &req, None).unwrap();
        assert_eq!(a.to.as_deref(), Some("a@b.c"));
        assert_eq!(a.cc, None);
    }
}
