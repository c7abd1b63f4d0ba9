//! Data models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{FieldError, RecorderError};

pub const SERIAL_NUMBER_MAX_LEN: usize = 50;
pub const BOAT_NAME_MAX_LEN: usize = 100;
pub const FLAG_MAX_LEN: usize = 50;
pub const BOAT_TYPE_MAX_LEN: usize = 50;
pub const BERTH_MAX_LEN: usize = 20;
pub const NOTES_MAX_LEN: usize = 1000;
pub const REMARKS_MAX_LEN: usize = 1000;
pub const CAPACITY_MAX: i64 = 10_000;
pub const LENGTH_MAX_M: f64 = 500.0;

/// Canonical boat serial number.
///
/// Serial numbers are compared and stored upper-cased and may only contain
/// upper-case ASCII letters, digits and hyphens.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct SerialNumber(String);

impl TryFrom<&str> for SerialNumber {
    type Error = RecorderError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::normalize(value).map_err(RecorderError::InvalidSerialNumber)
    }
}

impl SerialNumber {
    /// Normalize and validate a raw serial number.
    ///
    /// Returns a human-readable message on failure, so callers collecting
    /// per-field validation errors can attach it to the offending field.
    pub fn normalize(value: &str) -> Result<Self, String> {
        let normalized = value.trim().to_uppercase();
        if normalized.is_empty() {
            return Err("serial number is required".to_string());
        }
        if normalized.len() > SERIAL_NUMBER_MAX_LEN {
            return Err(format!(
                "serial number is longer than {SERIAL_NUMBER_MAX_LEN} characters"
            ));
        }
        if !normalized
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '-')
        {
            return Err(
                "serial number may only contain letters, digits and hyphens".to_string(),
            );
        }
        Ok(Self(normalized))
    }

    /// Get the canonical serial number string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SerialNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Originating channel of a recorded movement
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Default,
)]
#[serde(rename_all = "UPPERCASE")]
#[sqlx(rename_all = "UPPERCASE")]
pub enum MovementSource {
    #[default]
    Manual,
    Api,
    Scan,
    Import,
}

impl std::str::FromStr for MovementSource {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_uppercase().as_str() {
            "MANUAL" => Ok(MovementSource::Manual),
            "API" => Ok(MovementSource::Api),
            "SCAN" => Ok(MovementSource::Scan),
            "IMPORT" => Ok(MovementSource::Import),
            other => Err(format!("unknown source '{other}'")),
        }
    }
}

impl MovementSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementSource::Manual => "MANUAL",
            MovementSource::Api => "API",
            MovementSource::Scan => "SCAN",
            MovementSource::Import => "IMPORT",
        }
    }
}

/// Kind of a movement record.
///
/// Only `Arrival` movements are ever created; a departure mutates the active
/// arrival movement instead of creating a record. `Departure` exists as a
/// journal filter value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Default)]
#[serde(rename_all = "UPPERCASE")]
#[sqlx(rename_all = "UPPERCASE")]
pub enum MovementKind {
    #[default]
    Arrival,
    Departure,
}

impl std::str::FromStr for MovementKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_uppercase().as_str() {
            "ARRIVAL" => Ok(MovementKind::Arrival),
            "DEPARTURE" => Ok(MovementKind::Departure),
            other => Err(format!("unknown movement kind '{other}'")),
        }
    }
}

impl MovementKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementKind::Arrival => "ARRIVAL",
            MovementKind::Departure => "DEPARTURE",
        }
    }
}

/// Derived berth status of a boat.
///
/// Never persisted: always computed from the presence of an active movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BoatStatus {
    #[serde(rename = "AT_BERTH")]
    AtBerth,
    #[serde(rename = "AT_SEA")]
    AtSea,
}

impl BoatStatus {
    /// Derive the status from the presence of an active movement.
    pub fn derive(has_active_movement: bool) -> Self {
        if has_active_movement {
            BoatStatus::AtBerth
        } else {
            BoatStatus::AtSea
        }
    }
}

/// Audit log action kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AuditAction {
    Arrival,
    Departure,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Arrival => "ARRIVAL",
            AuditAction::Departure => "DEPARTURE",
        }
    }
}

/// One append-only audit record describing a ledger mutation
#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub action: AuditAction,
    pub entity: String,
    pub entity_id: String,
    pub changes: Option<serde_json::Value>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// A registered boat
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Boat {
    pub id: i64,
    pub serial_number: String,
    pub name: String,
    pub flag: Option<String>,
    pub boat_type: Option<String>,
    pub capacity: Option<i64>,
    pub length_m: Option<f64>,
    pub remarks: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A single stay record for a boat
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Movement {
    pub id: i64,
    pub boat_id: i64,
    pub kind: MovementKind,
    pub arrival_at: DateTime<Utc>,
    pub departure_at: Option<DateTime<Utc>>,
    pub berth: Option<String>,
    pub source: MovementSource,
    pub notes: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// Arrival request body, prior to validation
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ArrivalRequest {
    pub serial_number: String,
    pub boat_name: String,
    pub flag: Option<String>,
    #[serde(rename = "type")]
    pub boat_type: Option<String>,
    pub capacity: Option<i64>,
    pub length: Option<f64>,
    pub berth: Option<String>,
    pub notes: Option<String>,
    pub remarks: Option<String>,
    pub source: Option<MovementSource>,
}

/// Validated arrival input
#[derive(Debug, Clone, PartialEq)]
pub struct NewArrival {
    pub serial_number: SerialNumber,
    pub name: String,
    pub flag: Option<String>,
    pub boat_type: Option<String>,
    pub capacity: Option<i64>,
    pub length_m: Option<f64>,
    pub berth: Option<String>,
    pub notes: Option<String>,
    pub remarks: Option<String>,
    pub source: MovementSource,
}

impl ArrivalRequest {
    /// Validate the request, reporting every failing field.
    pub fn validate(self) -> Result<NewArrival, RecorderError> {
        let mut errors = Vec::new();

        let serial_number = SerialNumber::normalize(&self.serial_number);
        if let Err(message) = &serial_number {
            errors.push(FieldError::new("serialNumber", message.clone()));
        }

        let name = self.boat_name.trim().to_string();
        if name.is_empty() {
            errors.push(FieldError::new("boatName", "boat name is required"));
        } else if name.len() > BOAT_NAME_MAX_LEN {
            errors.push(FieldError::new(
                "boatName",
                format!("boat name is longer than {BOAT_NAME_MAX_LEN} characters"),
            ));
        }

        check_len(&mut errors, "flag", self.flag.as_deref(), FLAG_MAX_LEN);
        check_len(&mut errors, "type", self.boat_type.as_deref(), BOAT_TYPE_MAX_LEN);
        check_len(&mut errors, "berth", self.berth.as_deref(), BERTH_MAX_LEN);
        check_len(&mut errors, "notes", self.notes.as_deref(), NOTES_MAX_LEN);
        check_len(&mut errors, "remarks", self.remarks.as_deref(), REMARKS_MAX_LEN);

        if let Some(capacity) = self.capacity {
            if capacity <= 0 {
                errors.push(FieldError::new("capacity", "capacity must be positive"));
            } else if capacity > CAPACITY_MAX {
                errors.push(FieldError::new(
                    "capacity",
                    format!("capacity must not exceed {CAPACITY_MAX}"),
                ));
            }
        }

        if let Some(length) = self.length {
            if length <= 0.0 {
                errors.push(FieldError::new("length", "length must be positive"));
            } else if length > LENGTH_MAX_M {
                errors.push(FieldError::new(
                    "length",
                    format!("length must not exceed {LENGTH_MAX_M} meters"),
                ));
            }
        }

        RecorderError::from_field_errors(errors)?;

        Ok(NewArrival {
            serial_number: serial_number.map_err(RecorderError::InvalidSerialNumber)?,
            name,
            flag: none_if_blank(self.flag),
            boat_type: none_if_blank(self.boat_type),
            capacity: self.capacity,
            length_m: self.length,
            berth: none_if_blank(self.berth),
            notes: none_if_blank(self.notes),
            remarks: none_if_blank(self.remarks),
            source: self.source.unwrap_or_default(),
        })
    }
}

/// Departure request body, prior to validation
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct DepartureRequest {
    pub serial_number: String,
    pub notes: Option<String>,
}

/// Validated departure input
#[derive(Debug, Clone, PartialEq)]
pub struct NewDeparture {
    pub serial_number: SerialNumber,
    pub notes: Option<String>,
}

impl DepartureRequest {
    /// Validate the request, reporting every failing field.
    pub fn validate(self) -> Result<NewDeparture, RecorderError> {
        let mut errors = Vec::new();

        let serial_number = SerialNumber::normalize(&self.serial_number);
        if let Err(message) = &serial_number {
            errors.push(FieldError::new("serialNumber", message.clone()));
        }

        check_len(&mut errors, "notes", self.notes.as_deref(), NOTES_MAX_LEN);

        RecorderError::from_field_errors(errors)?;

        Ok(NewDeparture {
            serial_number: serial_number.map_err(RecorderError::InvalidSerialNumber)?,
            notes: none_if_blank(self.notes),
        })
    }
}

fn check_len(errors: &mut Vec<FieldError>, field: &str, value: Option<&str>, max: usize) {
    if let Some(value) = value {
        if value.len() > max {
            errors.push(FieldError::new(
                field,
                format!("{field} is longer than {max} characters"),
            ));
        }
    }
}

fn none_if_blank(value: Option<String>) -> Option<String> {
    value.and_then(|v| {
        let trimmed = v.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

/// Lower-case a string and strip common Latin diacritics, for
/// accent-insensitive substring search.
pub fn fold_for_search(value: &str) -> String {
    value
        .chars()
        .flat_map(|c| {
            let folded = match c {
                'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' | 'À' | 'Á' | 'Â' | 'Ã' | 'Ä' | 'Å' => 'a',
                'ç' | 'Ç' => 'c',
                'è' | 'é' | 'ê' | 'ë' | 'È' | 'É' | 'Ê' | 'Ë' => 'e',
                'ì' | 'í' | 'î' | 'ï' | 'Ì' | 'Í' | 'Î' | 'Ï' => 'i',
                'ñ' | 'Ñ' => 'n',
                'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'Ò' | 'Ó' | 'Ô' | 'Õ' | 'Ö' => 'o',
                'ù' | 'ú' | 'û' | 'ü' | 'Ù' | 'Ú' | 'Û' | 'Ü' => 'u',
                'ý' | 'ÿ' | 'Ý' => 'y',
                other => other,
            };
            folded.to_lowercase()
        })
        .collect()
}
