//! Intake validation: profile URL shape and normalization, email and phone
//! checks. Normalization is also the customer dedup key, so two spellings of
//! the same profile URL must collapse to one string.

use super::domain::TargetAudience;
use serde::Deserialize;

/// Path prefixes that mark a non-personal page on the professional network.
const NON_PERSONAL_SEGMENTS: [&str; 4] = ["company", "school", "showcase", "jobs"];

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum IntakeError {
    #[error("'{0}' is not a well-formed profile URL")]
    MalformedUrl(String),
    #[error("'{0}' is not a personal profile URL")]
    NotPersonalProfile(String),
    #[error("'{0}' is not a valid email address")]
    InvalidEmail(String),
    #[error("'{0}' is not a valid phone number")]
    InvalidPhone(String),
}

/// Raw intake submission as it arrives from the client.
#[derive(Debug, Clone, Deserialize)]
pub struct IntakeRequest {
    pub profile_url: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    pub target_audience: TargetAudience,
}

/// An intake request that passed validation. `profile_url` is normalized and
/// safe to use as a dedup key.
#[derive(Debug, Clone)]
pub struct ValidatedIntake {
    pub profile_url: String,
    pub email: String,
    pub phone: Option<String>,
    pub target_audience: TargetAudience,
}

impl IntakeRequest {
    pub fn validated(self) -> Result<ValidatedIntake, IntakeError> {
        let profile_url = normalize_profile_url(&self.profile_url)?;

        let email = self.email.trim().to_ascii_lowercase();
        if !is_valid_email(&email) {
            return Err(IntakeError::InvalidEmail(self.email));
        }

        let phone = match self.phone.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => {
                if !is_valid_phone(raw) {
                    return Err(IntakeError::InvalidPhone(raw.to_string()));
                }
                Some(raw.to_string())
            }
        };

        Ok(ValidatedIntake {
            profile_url,
            email,
            phone,
            target_audience: self.target_audience,
        })
    }
}

/// Normalize a personal-profile URL to `https://<host>/in/<slug>`.
///
/// Accepts http or https, a leading `www.`, trailing slashes, and query or
/// fragment noise after the slug. Rejects company/school/page URLs and
/// anything whose first path segment is not `in`.
pub fn normalize_profile_url(raw: &str) -> Result<String, IntakeError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(IntakeError::MalformedUrl(raw.to_string()));
    }

    let rest = trimmed
        .strip_prefix("https://")
        .or_else(|| trimmed.strip_prefix("http://"))
        .ok_or_else(|| IntakeError::MalformedUrl(raw.to_string()))?;

    let (host, path) = match rest.split_once('/') {
        Some((host, path)) => (host, path),
        None => (rest, ""),
    };

    let host = host.to_ascii_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host);
    if host.is_empty() || host.contains(char::is_whitespace) {
        return Err(IntakeError::MalformedUrl(raw.to_string()));
    }

    let mut segments = path.split('/').filter(|segment| !segment.is_empty());
    let kind = segments
        .next()
        .ok_or_else(|| IntakeError::NotPersonalProfile(raw.to_string()))?
        .to_ascii_lowercase();

    if NON_PERSONAL_SEGMENTS.contains(&kind.as_str()) {
        return Err(IntakeError::NotPersonalProfile(raw.to_string()));
    }
    if kind != "in" {
        return Err(IntakeError::NotPersonalProfile(raw.to_string()));
    }

    let slug = segments
        .next()
        .ok_or_else(|| IntakeError::NotPersonalProfile(raw.to_string()))?;
    let slug: String = slug
        .split(['?', '#'])
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase();

    let slug_ok = !slug.is_empty()
        && slug
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '%'));
    if !slug_ok {
        return Err(IntakeError::NotPersonalProfile(raw.to_string()));
    }

    Ok(format!("https://{host}/in/{slug}"))
}

pub fn is_valid_email(email: &str) -> bool {
    let email = email.trim();
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };

    !local.is_empty()
        && !domain.is_empty()
        && !email.contains(char::is_whitespace)
        && !email[local.len() + 1..].contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
}

/// Phone numbers are optional; when present they must reduce to an optional
/// `+` followed by 10-15 digits once separators are stripped.
pub fn is_valid_phone(phone: &str) -> bool {
    let cleaned: String = phone
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '(' | ')' | '.'))
        .collect();

    let digits = cleaned.strip_prefix('+').unwrap_or(&cleaned);
    (10..=15).contains(&digits.len()) && digits.chars().all(|c| c.is_ascii_digit())
}
