//! Turning backend profiles and stored JSON into [`User`] values

use booth_client::RawProfile;
use booth_core::{parse_timestamp, protocol_error, BoothError, BoothResult, ErrorContext, Role, User};

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

/// Build a [`User`] from a backend profile.
///
/// `fallback_email` fills in the address when the profile has none. Fails
/// with a protocol error when the profile carries no id.
pub fn normalize_profile(raw: &RawProfile, fallback_email: Option<&str>) -> BoothResult<User> {
    let id = raw.identifier().ok_or_else(|| {
        protocol_error!("Backend profile carries no user id", "session_normalize")
    })?;

    Ok(User {
        id: id.to_string(),
        display_name: non_blank(raw.name.as_deref()).unwrap_or_default().to_string(),
        email: non_blank(raw.email.as_deref())
            .or_else(|| non_blank(fallback_email))
            .unwrap_or_default()
            .to_string(),
        role: raw.role.as_deref().and_then(Role::from_backend),
        phone: non_blank(raw.tel.as_deref()).map(str::to_string),
        created_at: raw.created_at.as_deref().and_then(parse_timestamp),
    })
}

/// Parse the persisted `user` entry
pub fn decode_stored_user(json: &str) -> BoothResult<User> {
    let user: User = serde_json::from_str(json).map_err(|e| BoothError::StorageCorruption {
        message: format!("Stored user is not valid JSON: {}", e),
        context: ErrorContext::new("session_normalize").with_operation("decode_stored_user"),
    })?;

    if user.id.trim().is_empty() {
        return Err(BoothError::StorageCorruption {
            message: "Stored user has an empty id".to_string(),
            context: ErrorContext::new("session_normalize").with_operation("decode_stored_user"),
        });
    }

    Ok(user)
}

/// Serialize a user for the `user` entry
pub fn encode_stored_user(user: &User) -> BoothResult<String> {
    Ok(serde_json::to_string(user)?)
}
