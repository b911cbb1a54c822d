//! Store records, their approval status, and input validation.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};

use crate::geo::{Coordinate, Locatable};
use crate::CoreError;

pub const MAX_NAME_LEN: usize = 200;
pub const MAX_PERMIT_IMAGES: usize = 5;

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email pattern compiles")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreStatus {
    Pending,
    Approved,
    Rejected,
}

impl StoreStatus {
    pub const ALL: [StoreStatus; 3] = [Self::Pending, Self::Approved, Self::Rejected];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            StoreStatus::Pending => "pending",
            StoreStatus::Approved => "approved",
            StoreStatus::Rejected => "rejected",
        }
    }
}

impl std::fmt::Display for StoreStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for StoreStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(StoreStatus::Pending),
            "approved" => Ok(StoreStatus::Approved),
            "rejected" => Ok(StoreStatus::Rejected),
            other => Err(CoreError::InvalidStatus(other.to_string())),
        }
    }
}

/// Whoever is performing an admin action; recorded as `reviewed_by`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
}

impl Actor {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Store {
    pub id: String,
    pub name: String,
    pub address: String,
    pub description: Option<String>,
    pub location: Coordinate,
    pub owner_id: String,
    pub status: StoreStatus,
    /// Address declared on the store itself; fallback recipient for notifications.
    pub contact_email: Option<String>,
    pub image_ref: Option<String>,
    pub permit_image_refs: Vec<String>,
    /// Bumped on every write; used for compare-and-swap status updates.
    pub revision: i64,
    pub reviewed_by: Option<String>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Locatable for Store {
    fn coordinate(&self) -> Option<Coordinate> {
        self.location.coordinate()
    }
}

/// Owner-submitted store registration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewStore {
    pub name: String,
    pub address: String,
    pub description: Option<String>,
    pub location: Coordinate,
    pub owner_id: String,
    pub contact_email: Option<String>,
    pub image_ref: Option<String>,
    #[serde(default)]
    pub permit_image_refs: Vec<String>,
}

impl NewStore {
    /// Trim text fields and check every constraint before any I/O happens.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Validation`] or [`CoreError::InvalidCoordinate`]
    /// naming the first field that fails.
    pub fn validated(mut self) -> Result<Self, CoreError> {
        self.name = validate_name(&self.name)?;
        self.address = validate_required("address", &self.address)?;
        self.owner_id = validate_required("owner_id", &self.owner_id)?;
        validate_location(self.location)?;
        self.description = normalize_optional(self.description);
        self.contact_email = normalize_optional(self.contact_email);
        if let Some(email) = &self.contact_email {
            validate_email(email)?;
        }
        self.image_ref = normalize_optional(self.image_ref);
        validate_permits(&self.permit_image_refs)?;
        Ok(self)
    }
}

/// Sparse owner edit. `None` leaves a field untouched; the inner `Option`
/// of nullable fields distinguishes "clear" from "set".
#[allow(clippy::option_option)]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StorePatch {
    pub name: Option<String>,
    pub address: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,
    pub location: Option<Coordinate>,
    #[serde(default, deserialize_with = "double_option")]
    pub contact_email: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub image_ref: Option<Option<String>>,
    pub permit_image_refs: Option<Vec<String>>,
}

// A present-but-null field deserializes to Some(None) rather than None.
#[allow(clippy::option_option)]
fn double_option<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

impl StorePatch {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// # Errors
    ///
    /// Returns [`CoreError::Validation`] if the patch is empty or any present
    /// field violates the same rules as [`NewStore::validated`].
    pub fn validated(mut self) -> Result<Self, CoreError> {
        if self.is_empty() {
            return Err(CoreError::validation("patch", "no fields to update"));
        }
        if let Some(name) = &self.name {
            self.name = Some(validate_name(name)?);
        }
        if let Some(address) = &self.address {
            self.address = Some(validate_required("address", address)?);
        }
        if let Some(location) = self.location {
            validate_location(location)?;
        }
        if let Some(description) = self.description.take() {
            self.description = Some(normalize_optional(description));
        }
        if let Some(email) = self.contact_email.take() {
            let email = normalize_optional(email);
            if let Some(e) = &email {
                validate_email(e)?;
            }
            self.contact_email = Some(email);
        }
        if let Some(image_ref) = self.image_ref.take() {
            self.image_ref = Some(normalize_optional(image_ref));
        }
        if let Some(permits) = &self.permit_image_refs {
            validate_permits(permits)?;
        }
        Ok(self)
    }
}

fn validate_name(raw: &str) -> Result<String, CoreError> {
    let name = raw.trim();
    if name.is_empty() || name.chars().count() > MAX_NAME_LEN {
        return Err(CoreError::validation(
            "name",
            format!("must be 1–{MAX_NAME_LEN} characters"),
        ));
    }
    Ok(name.to_string())
}

fn validate_required(field: &'static str, raw: &str) -> Result<String, CoreError> {
    let value = raw.trim();
    if value.is_empty() {
        return Err(CoreError::validation(field, "must be non-empty"));
    }
    Ok(value.to_string())
}

fn validate_location(location: Coordinate) -> Result<(), CoreError> {
    Coordinate::new(location.latitude, location.longitude).map(|_| ())
}

fn validate_email(email: &str) -> Result<(), CoreError> {
    if EMAIL_RE.is_match(email) {
        Ok(())
    } else {
        Err(CoreError::validation(
            "contact_email",
            format!("'{email}' is not a valid email address"),
        ))
    }
}

fn validate_permits(permits: &[String]) -> Result<(), CoreError> {
    if permits.len() > MAX_PERMIT_IMAGES {
        return Err(CoreError::validation(
            "permit_image_refs",
            format!("at most {MAX_PERMIT_IMAGES} permit images, got {}", permits.len()),
        ));
    }
    if permits.iter().any(|p| p.trim().is_empty()) {
        return Err(CoreError::validation(
            "permit_image_refs",
            "permit image references must be non-empty",
        ));
    }
    Ok(())
}

fn normalize_optional(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Loose syntactic check shared with the owner directory adapters.
#[must_use]
pub fn is_plausible_email(value: &str) -> bool {
    EMAIL_RE.is_match(value.trim())
}
