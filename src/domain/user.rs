use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::validation::{self, FieldErrors, Payload, TextRules, UpdateMode};

pub const USERNAME_MAX_LENGTH: usize = 150;
pub const NAME_MAX_LENGTH: usize = 150;
pub const EMAIL_MAX_LENGTH: usize = 254;
pub const PASSWORD_MAX_LENGTH: usize = 128;

/// Largest avatar upload accepted on user update: 2 MiB.
pub const MAX_AVATAR_BYTES: usize = 2 * 1024 * 1024;

pub const INVALID_EMAIL: &str = "Enter a valid email address.";
pub const INVALID_USERNAME: &str =
    "Enter a valid username. This value may contain only letters, numbers, and @/./+/-/_ characters.";
pub const DUPLICATE_USERNAME: &str = "A user with that username already exists.";

pub type GroupId = i64;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct UserId(pub Uuid);

impl Default for UserId {
    fn default() -> Self { Self(Uuid::new_v4()) }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { self.0.fmt(f) }
}

impl FromStr for UserId {
    type Err = uuid::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> { Uuid::parse_str(s).map(Self) }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Group {
    pub id: GroupId,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password: PasswordHash,
    pub first_name: String,
    pub last_name: String,
    pub is_active: bool,
    pub is_staff: bool,
    pub is_superuser: bool,
    pub groups: Vec<GroupId>,
    pub date_joined: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

/// A plaintext password taken from a request. Never persisted as is.
#[derive(Clone, PartialEq, Eq)]
pub struct Password(String);

impl Password {
    pub fn new(raw: impl Into<String>) -> Self { Self(raw.into()) }
    pub fn expose(&self) -> &str { &self.0 }
}

impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str("Password(**)") }
}

/// An encoded password hash in PHC string format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordHash(pub String);

impl PasswordHash {
    pub fn as_str(&self) -> &str { &self.0 }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub is_active: bool,
    pub is_staff: bool,
    pub is_superuser: bool,
    pub groups: Vec<GroupId>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserChanges {
    pub username: Option<String>,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub is_active: Option<bool>,
    pub is_staff: Option<bool>,
    pub is_superuser: Option<bool>,
    /// Replacement group set; `None` keeps the current memberships.
    pub groups: Option<Vec<GroupId>>,
}

/// Metadata of an uploaded avatar file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Avatar {
    pub file_name: Option<String>,
    pub size: usize,
}

impl Avatar {
    pub fn exceeds_limit(&self) -> bool { self.size > MAX_AVATAR_BYTES }
}

impl NewUser {
    pub fn from_payload(payload: &Payload) -> Result<(Self, Password), FieldErrors> {
        let mut errors = FieldErrors::new();
        let username = username(payload, true, &mut errors);
        let email = email(payload, true, &mut errors);
        let password = password(payload, true, &mut errors);
        let first_name = validation::text(payload, "first_name", TextRules::blankable(Some(NAME_MAX_LENGTH)), false, &mut errors);
        let last_name = validation::text(payload, "last_name", TextRules::blankable(Some(NAME_MAX_LENGTH)), false, &mut errors);
        let is_active = validation::boolean(payload, "is_active", &mut errors);
        let is_staff = validation::boolean(payload, "is_staff", &mut errors);
        let is_superuser = validation::boolean(payload, "is_superuser", &mut errors);
        let groups = validation::primary_keys(payload, "groups", &mut errors);

        match (username, email, password) {
            (Some(username), Some(email), Some(password)) if errors.is_empty() => Ok((
                NewUser {
                    username,
                    email,
                    first_name: first_name.unwrap_or_default(),
                    last_name: last_name.unwrap_or_default(),
                    is_active: is_active.unwrap_or(true),
                    is_staff: is_staff.unwrap_or(false),
                    is_superuser: is_superuser.unwrap_or(false),
                    groups: groups.unwrap_or_default(),
                },
                password,
            )),
            _ => Err(errors),
        }
    }
}

impl UserChanges {
    pub fn from_payload(payload: &Payload, mode: UpdateMode) -> Result<(Self, Option<Password>), FieldErrors> {
        let required = !mode.is_partial();
        let mut errors = FieldErrors::new();
        let changes = UserChanges {
            username: username(payload, required, &mut errors),
            email: email(payload, required, &mut errors),
            first_name: validation::text(payload, "first_name", TextRules::blankable(Some(NAME_MAX_LENGTH)), false, &mut errors),
            last_name: validation::text(payload, "last_name", TextRules::blankable(Some(NAME_MAX_LENGTH)), false, &mut errors),
            is_active: validation::boolean(payload, "is_active", &mut errors),
            is_staff: validation::boolean(payload, "is_staff", &mut errors),
            is_superuser: validation::boolean(payload, "is_superuser", &mut errors),
            groups: validation::primary_keys(payload, "groups", &mut errors),
        };
        let password = password(payload, false, &mut errors);
        errors.finish((changes, password))
    }

    pub fn apply(self, user: &mut User) {
        if let Some(v) = self.username { user.username = v; }
        if let Some(v) = self.email { user.email = v; }
        if let Some(v) = self.first_name { user.first_name = v; }
        if let Some(v) = self.last_name { user.last_name = v; }
        if let Some(v) = self.is_active { user.is_active = v; }
        if let Some(v) = self.is_staff { user.is_staff = v; }
        if let Some(v) = self.is_superuser { user.is_superuser = v; }
        if let Some(v) = self.groups { user.groups = v; }
    }
}

/// The trimmed `email` of a raw payload, if it carries a non-empty one.
pub fn payload_email(payload: &Payload) -> Option<&str> {
    payload.get("email")?.as_str().map(str::trim).filter(|e| !e.is_empty())
}

fn username(payload: &Payload, required: bool, errors: &mut FieldErrors) -> Option<String> {
    let value = validation::text(payload, "username", TextRules::required(Some(USERNAME_MAX_LENGTH)), required, errors)?;
    if !value.chars().all(|c| c.is_alphanumeric() || matches!(c, '@' | '.' | '+' | '-' | '_')) {
        errors.add("username", INVALID_USERNAME);
        return None;
    }
    Some(value)
}

fn email(payload: &Payload, required: bool, errors: &mut FieldErrors) -> Option<String> {
    let value = validation::text(payload, "email", TextRules::required(Some(EMAIL_MAX_LENGTH)), required, errors)?;
    if !is_valid_email(&value) {
        errors.add("email", INVALID_EMAIL);
        return None;
    }
    Some(value)
}

fn password(payload: &Payload, required: bool, errors: &mut FieldErrors) -> Option<Password> {
    // Passwords keep their surrounding whitespace.
    match payload.get("password") {
        Some(serde_json::Value::String(raw)) if raw.chars().count() > PASSWORD_MAX_LENGTH => {
            errors.add("password", format!("Ensure this field has no more than {PASSWORD_MAX_LENGTH} characters."));
            None
        }
        Some(serde_json::Value::String(raw)) if !raw.trim().is_empty() => Some(Password::new(raw.clone())),
        _ => validation::text(payload, "password", TextRules::required(Some(PASSWORD_MAX_LENGTH)), required, errors).map(Password::new),
    }
}

fn is_valid_email(value: &str) -> bool {
    let Some((local, domain)) = value.rsplit_once('@') else { return false };
    !local.is_empty()
        && !local.contains('@')
        && !value.chars().any(char::is_whitespace)
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !domain.contains("..")
}
