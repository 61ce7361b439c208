//! Group signatures on outgoing email.
//!
//! The signature is appended as a tagged trailing block so it can be found and
//! removed again (e.g. when the article type is switched away from email).

use super::body::escape_html;
use super::entities::{Actor, Signature};
use super::template;
use regex::Regex;
use std::sync::LazyLock;

/// Empty paragraph separating the body from the signature block.
pub const SEPARATOR: &str = "<p><br></p>";

static SIGNATURE_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)(?:<p><br></p>)?<div data-signature="true" data-signature-id="(\d+)">.*?</div>"#)
        .expect("signature block regex")
});

/// Signature template with the agent's fields substituted (values HTML-escaped).
pub fn render(signature: &Signature, agent: &Actor) -> String {
    template::render(&signature.body, |path| {
        let value = match path {
            "user.firstname" => agent.firstname.clone(),
            "user.lastname" => agent.lastname.clone(),
            "user.fullname" => agent.display_name(),
            "user.email" => agent.email.clone()?,
            _ => return None,
        };
        Some(escape_html(&value))
    })
}

/// The tagged `<div>` carrying the rendered signature.
pub fn block(signature: &Signature, agent: &Actor) -> String {
    format!(
        r#"<div data-signature="true" data-signature-id="{}"><p>{}</p></div>"#,
        signature.id,
        render(signature, agent)
    )
}

/// `body` followed by the separator and the signature block.
/// A body that already carries this signature is returned unchanged; any other
/// signature block is replaced.
pub fn append(body_html: &str, signature: &Signature, agent: &Actor) -> String {
    match find_signature_id(body_html) {
        Some(id) if id == signature.id => return body_html.to_string(),
        Some(_) => return append(&strip(body_html), signature, agent),
        None => {}
    }
    let mut out = String::with_capacity(body_html.len() + signature.body.len() + 96);
    out.push_str(body_html);
    out.push_str(SEPARATOR);
    out.push_str(&block(signature, agent));
    out
}

/// Id of the first signature block in `body_html`, if any.
pub fn find_signature_id(body_html: &str) -> Option<i64> {
    SIGNATURE_BLOCK
        .captures(body_html)
        .and_then(|c| c[1].parse().ok())
}

/// Remove every signature block (and its separator) from `body_html`.
pub fn strip(body_html: &str) -> String {
    SIGNATURE_BLOCK.replace_all(body_html, "").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::Role;

    fn agent() -> Actor {
        Actor {
            id: 3,
            role: Role::Agent,
            firstname: "Nicole".into(),
            lastname: "Braun".into(),
            email: Some("nicole@example.com".into()),
        }
    }

    fn signature() -> Signature {
        Signature {
            id: 42,
            name: "default".into(),
            body: "#{user.firstname}<br>Signature!".into(),
            active: true,
        }
    }

    #[test]
    fn test_append_matches_expected_markup() {
        let body = append("<p>This is a note!</p>", &signature(), &agent());
        assert_eq!(
            body,
            "<p>This is a note!</p><p><br></p><div data-signature=\"true\" data-signature-id=\"42\"><p>Nicole<br>Signature!</p></div>"
        );
    }

    #[test]
    fn test_append_is_idempotent() {
        let once = append("<p>x</p>", &signature(), &agent());
        assert_eq!(append(&once, &signature(), &agent()), once);
    }

    #[test]
    fn test_append_replaces_other_signature() {
        let old = Signature {
            id: 7,
            body: "Old team".into(),
            ..signature()
        };
        let body = append("<p>x</p>", &old, &agent());
        let swapped = append(&body, &signature(), &agent());
        assert_eq!(swapped, append("<p>x</p>", &signature(), &agent()));
        assert_eq!(find_signature_id(&swapped), Some(42));
        assert!(!swapped.contains("Old team"));
    }

    #[test]
    fn test_find_and_strip() {
        let body = append("<p>x</p>", &signature(), &agent());
        assert_eq!(find_signature_id(&body), Some(42));
        assert_eq!(strip(&body), "<p>x</p>");
        assert_eq!(find_signature_id("<p>x</p>"), None);
    }

    #[test]
    fn test_render_escapes_values() {
        let mut a = agent();
        a.firstname = "<Nic>".into();
        assert_eq!(render(&signature(), &a), "&lt;Nic&gt;<br>Signature!");
    }

    #[test]
    fn test_render_fullname_and_unknown() {
        let sig = Signature {
            body: "#{user.fullname} / #{user.phone}".into(),
            ..signature()
        };
        assert_eq!(render(&sig, &agent()), "Nicole Braun / -");
    }
}
