use crate::ProfileError;

/// Characters a stored profile name may contain, besides ASCII letters and digits.
const ALLOWED_PUNCTUATION: &str = "-_.() ";

/// Derive a storage-safe profile name.
///
/// Path separators are rejected; other disallowed characters are dropped,
/// spaces become underscores and the result is lowercased.
pub fn sanitize_profile_name(name: &str) -> Result<String, ProfileError> {
    if name.contains('/') || name.contains('\\') {
        return Err(ProfileError::InvalidName(
            "name must not contain / or \\".to_owned(),
        ));
    }

    let sanitized: String = name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || ALLOWED_PUNCTUATION.contains(*c))
        .map(|c| if c == ' ' { '_' } else { c.to_ascii_lowercase() })
        .collect();

    if sanitized.is_empty() || sanitized.chars().all(|c| c == '.') {
        return Err(ProfileError::InvalidName(format!(
            "'{name}' has no usable characters"
        )));
    }
    Ok(sanitized)
}
