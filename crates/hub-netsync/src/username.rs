//! Hotspot username templates and password generation

use rand::Rng;

use crate::error::{SyncError, SyncResult};
use crate::member::MemberProfile;

/// Password alphabet without look-alike characters (0/O, 1/l/I)
const PASSWORD_CHARSET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz23456789";

/// Render a router username such as `{phone}` or `hub-{member_code}`
///
/// Unknown placeholders and placeholders with no value for this member are
/// errors: a blank username would collide across members.
pub fn render_username(template: &str, member: &MemberProfile) -> SyncResult<String> {
    let mut out = String::with_capacity(template.len() + 16);
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let close = after.find('}').ok_or_else(|| {
            SyncError::Username(format!("unclosed placeholder in template '{}'", template))
        })?;
        let key = &after[..close];
        let value = placeholder_value(key, member)?;
        if value.is_empty() {
            return Err(SyncError::Username(format!(
                "member {} has no value for {{{}}}",
                member.id, key
            )));
        }
        out.push_str(&value);
        rest = &after[close + 1..];
    }
    out.push_str(rest);

    let username = out.trim().to_string();
    if username.is_empty() {
        return Err(SyncError::Username(format!("template '{}' renders empty", template)));
    }
    Ok(username)
}

fn placeholder_value(key: &str, member: &MemberProfile) -> SyncResult<String> {
    let value = match key {
        "phone" => member.phone.as_deref().map(normalize_phone).unwrap_or_default(),
        "member_code" => member.member_code.clone().unwrap_or_default(),
        "email" => member.email.as_deref().map(|e| e.trim().to_lowercase()).unwrap_or_default(),
        "id" => member.id.to_string(),
        other => {
            return Err(SyncError::Username(format!("unknown placeholder {{{}}}", other)));
        }
    };
    Ok(value)
}

/// Keep digits and a leading `+`
pub fn normalize_phone(phone: &str) -> String {
    let trimmed = phone.trim();
    let mut out = String::with_capacity(trimmed.len());
    if trimmed.starts_with('+') {
        out.push('+');
    }
    out.extend(trimmed.chars().filter(|c| c.is_ascii_digit()));
    if out == "+" {
        out.clear();
    }
    out
}

/// Random hotspot password
pub fn generate_password(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| PASSWORD_CHARSET[rng.gen_range(0..PASSWORD_CHARSET.len())] as char)
        .collect()
}
