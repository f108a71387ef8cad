use crate::error::{ChannelError, Result};

/// Longest accepted channel name, in characters.
pub const MAX_CHANNEL_NAME_LEN: usize = 25;

/// Validate a channel name and return it trimmed.
///
/// Accepted names are non-empty after trimming, at most
/// [`MAX_CHANNEL_NAME_LEN`] characters, and use only ASCII letters, digits
/// and `/`.
pub fn validate_channel_name(raw: &str) -> Result<String> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(ChannelError::EmptyName);
    }
    if name.chars().count() > MAX_CHANNEL_NAME_LEN {
        return Err(ChannelError::NameTooLong {
            name: name.to_string(),
            max: MAX_CHANNEL_NAME_LEN,
        });
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '/') {
        return Err(ChannelError::InvalidCharacter(name.to_string()));
    }
    Ok(name.to_string())
}
