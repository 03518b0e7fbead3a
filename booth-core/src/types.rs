//! Core data type definitions

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::logging::LoggingConfig;

/// Role granted to an account by the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Regular account; older backends call it "user"
    #[serde(alias = "user")]
    Member,
    Admin,
}

impl Role {
    /// Interpret a role string sent by the backend. Unknown roles map to `None`.
    pub fn from_backend(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "admin" => Some(Role::Admin),
            "member" | "user" => Some(Role::Member),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Member => "member",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::from_backend(s).ok_or_else(|| format!("Unknown role: {}", s))
    }
}

/// Authenticated account as held by the session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(alias = "_id")]
    pub id: String,
    #[serde(default, alias = "name")]
    pub display_name: String,
    pub email: String,
    #[serde(
        default,
        deserialize_with = "lenient_role",
        skip_serializing_if = "Option::is_none"
    )]
    pub role: Option<Role>,
    #[serde(default, alias = "tel", skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub created_at: Option<DateTime<Utc>>,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == Some(Role::Admin)
    }
}

fn lenient_role<'de, D>(deserializer: D) -> Result<Option<Role>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<String> = Option::deserialize(deserializer)?;
    Ok(value.as_deref().and_then(Role::from_backend))
}

fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<String> = Option::deserialize(deserializer)?;
    Ok(value.as_deref().and_then(parse_timestamp))
}

/// Parse the timestamp formats the backend is known to emit.
///
/// Accepts RFC 3339 (`2025-05-01T10:00:00.000Z`) and bare dates (`2025-05-01`,
/// interpreted as midnight UTC).
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Lifecycle state of the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Uninitialized,
    Restoring,
    Authenticated,
    Anonymous,
}

impl SessionStatus {
    /// True while the session has not settled yet
    pub fn is_loading(&self) -> bool {
        matches!(self, SessionStatus::Uninitialized | SessionStatus::Restoring)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionStatus::Uninitialized => "uninitialized",
            SessionStatus::Restoring => "restoring",
            SessionStatus::Authenticated => "authenticated",
            SessionStatus::Anonymous => "anonymous",
        };
        f.write_str(name)
    }
}

/// Snapshot of who is logged in.
///
/// The user and the token are either both present or both absent; the
/// constructors are the only way to build a session.
#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    user: Option<User>,
    token: Option<String>,
    status: SessionStatus,
}

impl Session {
    pub fn uninitialized() -> Self {
        Self::empty(SessionStatus::Uninitialized)
    }

    pub fn restoring() -> Self {
        Self::empty(SessionStatus::Restoring)
    }

    pub fn anonymous() -> Self {
        Self::empty(SessionStatus::Anonymous)
    }

    pub fn authenticated(user: User, token: String) -> Self {
        Self {
            user: Some(user),
            token: Some(token),
            status: SessionStatus::Authenticated,
        }
    }

    fn empty(status: SessionStatus) -> Self {
        Self {
            user: None,
            token: None,
            status,
        }
    }

    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn is_authenticated(&self) -> bool {
        self.status == SessionStatus::Authenticated
    }

    pub fn is_loading(&self) -> bool {
        self.status.is_loading()
    }

    pub fn role(&self) -> Option<Role> {
        self.user.as_ref().and_then(|user| user.role)
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::uninitialized()
    }
}

// Tokens are credentials and must not end up in logs.
impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("user", &self.user)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("status", &self.status)
            .finish()
    }
}

/// Payload for creating a new account
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    pub name: String,
    pub email: String,
    pub tel: String,
    pub role: Role,
    pub password: String,
    pub created_at: DateTime<Utc>,
}

impl Registration {
    pub fn new(name: &str, email: &str, tel: &str, password: &str, role: Role) -> Self {
        Self {
            name: name.to_string(),
            email: email.to_string(),
            tel: tel.to_string(),
            role,
            password: password.to_string(),
            created_at: Utc::now(),
        }
    }
}

/// Size of a booth
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BoothType {
    Small,
    Big,
}

impl fmt::Display for BoothType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BoothType::Small => f.write_str("small"),
            BoothType::Big => f.write_str("big"),
        }
    }
}

impl FromStr for BoothType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "small" => Ok(BoothType::Small),
            "big" => Ok(BoothType::Big),
            _ => Err(format!("Unknown booth type: {} (expected small or big)", s)),
        }
    }
}

/// Exhibition as returned by the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Exhibition {
    #[serde(rename = "_id", alias = "id")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub venue: String,
    pub start_date: DateTime<Utc>,
    pub duration_day: u32,
    pub small_booth_quota: u32,
    pub big_booth_quota: u32,
    #[serde(default)]
    pub poster_picture: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Payload for creating an exhibition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewExhibition {
    pub name: String,
    pub description: String,
    pub venue: String,
    pub start_date: DateTime<Utc>,
    pub duration_day: u32,
    pub small_booth_quota: u32,
    pub big_booth_quota: u32,
    pub poster_picture: String,
}

/// Partial update of an exhibition; only set fields are sent
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExhibitionUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub venue: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_day: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub small_booth_quota: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub big_booth_quota: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub poster_picture: Option<String>,
}

impl ExhibitionUpdate {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Either a bare id or the populated document, depending on the endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Reference<T> {
    Id(String),
    Embedded(T),
}

/// Anything that carries a backend id
pub trait Identified {
    fn id(&self) -> &str;
}

impl<T: Identified> Reference<T> {
    pub fn id(&self) -> &str {
        match self {
            Reference::Id(id) => id,
            Reference::Embedded(inner) => inner.id(),
        }
    }
}

/// Account fields the backend embeds in a populated booking
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookingOwner {
    #[serde(rename = "_id", alias = "id")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tel: Option<String>,
}

impl Identified for BookingOwner {
    fn id(&self) -> &str {
        &self.id
    }
}

/// Exhibition fields the backend embeds in a populated booking
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExhibitionSummary {
    #[serde(rename = "_id", alias = "id")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub venue: String,
    #[serde(
        default,
        deserialize_with = "lenient_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub start_date: Option<DateTime<Utc>>,
}

impl Identified for ExhibitionSummary {
    fn id(&self) -> &str {
        &self.id
    }
}

/// Booth booking
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    #[serde(rename = "_id", alias = "id")]
    pub id: String,
    pub user: Reference<BookingOwner>,
    pub exhibition: Reference<ExhibitionSummary>,
    pub booth_type: BoothType,
    pub amount: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Most booths one booking may reserve
pub const MAX_BOOTHS_PER_BOOKING: u32 = 6;

/// Payload for creating a booking
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewBooking {
    /// Owner id; the backend falls back to the caller when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    pub exhibition: String,
    pub booth_type: BoothType,
    pub amount: u32,
}

/// Partial update of a booking
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub booth_type: Option<BoothType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<u32>,
}

impl BookingUpdate {
    pub fn is_empty(&self) -> bool {
        self.booth_type.is_none() && self.amount.is_none()
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoothConfig {
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Where and how to reach the REST backend
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub base_url: String,
    pub timeout_seconds: u64,
    pub user_agent: String,
}

/// Durable client-side storage
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding the persisted session; `~` is expanded
    pub data_dir: String,
}
