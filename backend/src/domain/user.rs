//! User entity model.
//!
//! A [`NewUser`] carries caller-supplied field values until a repository
//! accepts it; a [`User`] is the stored form with its store-assigned
//! identifier and timestamps. Field values stay raw strings so that every
//! write path runs the same [`validate_user_fields`] predicate before it
//! touches the store.

use std::fmt;
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Validation errors returned by [`validate_user_fields`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UserValidationError {
    /// Email is empty.
    #[error("email must not be empty")]
    EmptyEmail,
    /// Email exceeds the maximum address length.
    #[error("email must be at most {max} characters")]
    EmailTooLong { max: usize },
    /// Email does not match the address grammar.
    #[error("email must be a valid address")]
    InvalidEmail,
    /// Screen name is empty.
    #[error("screen name must not be empty")]
    EmptyScreenName,
    /// Screen name exceeds the maximum length.
    #[error("screen name must be at most {max} characters")]
    ScreenNameTooLong { max: usize },
    /// Screen name contains characters outside the ASCII word class.
    #[error("screen name may only contain ASCII letters, digits, or underscores")]
    ScreenNameInvalidCharacters,
}

/// Maximum allowed length for an email address.
pub const EMAIL_MAX: usize = 254;
/// Maximum allowed length for a screen name.
pub const SCREEN_NAME_MAX: usize = 32;

static EMAIL_RE: OnceLock<Regex> = OnceLock::new();
static SCREEN_NAME_RE: OnceLock<Regex> = OnceLock::new();

fn email_regex() -> &'static Regex {
    EMAIL_RE.get_or_init(|| {
        let pattern = r"^[A-Za-z0-9.!#$%&'*+/=?^_`{|}~-]+@[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?(?:\.[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?)+$";
        Regex::new(pattern).unwrap_or_else(|error| panic!("email regex failed to compile: {error}"))
    })
}

fn screen_name_regex() -> &'static Regex {
    SCREEN_NAME_RE.get_or_init(|| {
        // Full-width and other non-ASCII forms fall outside this class.
        let pattern = "^[A-Za-z0-9_]+$";
        Regex::new(pattern)
            .unwrap_or_else(|error| panic!("screen name regex failed to compile: {error}"))
    })
}

/// Check an email and screen name pair against the format rules.
///
/// # Examples
/// ```
/// use user_registry::domain::{UserValidationError, validate_user_fields};
///
/// assert!(validate_user_fields("ada@example.test", "ada_l").is_ok());
/// assert_eq!(
///     validate_user_fields("bad_email", "ada_l"),
///     Err(UserValidationError::InvalidEmail)
/// );
/// ```
pub fn validate_user_fields(email: &str, screen_name: &str) -> Result<(), UserValidationError> {
    if email.is_empty() {
        return Err(UserValidationError::EmptyEmail);
    }
    if email.chars().count() > EMAIL_MAX {
        return Err(UserValidationError::EmailTooLong { max: EMAIL_MAX });
    }
    if !email_regex().is_match(email) {
        return Err(UserValidationError::InvalidEmail);
    }

    if screen_name.is_empty() {
        return Err(UserValidationError::EmptyScreenName);
    }
    if screen_name.chars().count() > SCREEN_NAME_MAX {
        return Err(UserValidationError::ScreenNameTooLong {
            max: SCREEN_NAME_MAX,
        });
    }
    if !screen_name_regex().is_match(screen_name) {
        return Err(UserValidationError::ScreenNameInvalidCharacters);
    }

    Ok(())
}

/// Boolean form of [`validate_user_fields`].
pub fn is_valid(email: &str, screen_name: &str) -> bool {
    validate_user_fields(email, screen_name).is_ok()
}

/// Store-assigned user identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(i64);

impl UserId {
    /// Wrap a raw identifier.
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// Access the raw identifier.
    pub const fn as_i64(self) -> i64 {
        self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for UserId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

/// Field values for a user that has not been stored yet.
///
/// The identifier and timestamps are assigned by the repository on create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    email: String,
    screen_name: String,
    age: u32,
}

impl NewUser {
    /// Build an unsaved user. No validation happens until the value is
    /// handed to a repository.
    pub fn new(email: impl Into<String>, screen_name: impl Into<String>, age: u32) -> Self {
        Self {
            email: email.into(),
            screen_name: screen_name.into(),
            age,
        }
    }

    /// Requested email address.
    pub fn email(&self) -> &str {
        self.email.as_str()
    }

    /// Requested screen name.
    pub fn screen_name(&self) -> &str {
        self.screen_name.as_str()
    }

    /// Requested age.
    pub fn age(&self) -> u32 {
        self.age
    }

    /// Run the format rules over the requested fields.
    pub fn validate(&self) -> Result<(), UserValidationError> {
        validate_user_fields(&self.email, &self.screen_name)
    }

    /// Attach an identifier and creation time, producing the stored form.
    pub fn into_user(self, id: UserId, now: DateTime<Utc>) -> User {
        let Self {
            email,
            screen_name,
            age,
        } = self;
        User {
            id,
            email,
            screen_name,
            age,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Stored user.
///
/// ## Invariants
/// - `id` never changes once assigned.
/// - `created_at` is set once at creation; `updated_at` is refreshed on
///   every successful update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    id: UserId,
    email: String,
    screen_name: String,
    age: u32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl User {
    /// Rebuild a stored user from its persisted components.
    pub fn new(
        id: UserId,
        email: impl Into<String>,
        screen_name: impl Into<String>,
        age: u32,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            email: email.into(),
            screen_name: screen_name.into(),
            age,
            created_at,
            updated_at,
        }
    }

    /// Store-assigned identifier.
    pub fn id(&self) -> UserId {
        self.id
    }

    /// Email address as entered by the user.
    pub fn email(&self) -> &str {
        self.email.as_str()
    }

    /// Screen name as entered by the user.
    pub fn screen_name(&self) -> &str {
        self.screen_name.as_str()
    }

    /// Age in years.
    pub fn age(&self) -> u32 {
        self.age
    }

    /// Creation timestamp.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Last successful update timestamp.
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Replace the email address. Takes effect on the next update.
    pub fn set_email(&mut self, email: impl Into<String>) {
        self.email = email.into();
    }

    /// Replace the screen name. Takes effect on the next update.
    pub fn set_screen_name(&mut self, screen_name: impl Into<String>) {
        self.screen_name = screen_name.into();
    }

    /// Replace the age. Takes effect on the next update.
    pub fn set_age(&mut self, age: u32) {
        self.age = age;
    }

    /// Run the format rules over the current fields.
    pub fn validate(&self) -> Result<(), UserValidationError> {
        validate_user_fields(&self.email, &self.screen_name)
    }

    /// Copy of `self` carrying the stored creation time and a fresh update
    /// time.
    pub(crate) fn revised(&self, created_at: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        Self {
            created_at,
            updated_at: now,
            ..self.clone()
        }
    }
}
