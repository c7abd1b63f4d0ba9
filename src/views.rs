//! Read projections over the movement ledger.
//!
//! Everything here is derived from persisted state at query time; in
//! particular the berth status is never stored, only computed from the
//! presence of an active movement.

use chrono::{DateTime, SecondsFormat, Utc};
use chrono_tz::Europe::Paris;
use serde::Serialize;

use crate::models::{Boat, BoatStatus, Movement, MovementKind, MovementSource};

/// A boat annotated with its derived status and current movement
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BoatWithMovement {
    #[serde(flatten)]
    pub boat: Boat,
    pub status: BoatStatus,
    pub current_movement: Option<Movement>,
}

impl BoatWithMovement {
    pub fn new(boat: Boat, current_movement: Option<Movement>) -> Self {
        let status = BoatStatus::derive(current_movement.is_some());
        Self {
            boat,
            status,
            current_movement,
        }
    }
}

/// A boat with its full movement history, newest arrival first
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BoatDetail {
    #[serde(flatten)]
    pub boat: Boat,
    pub status: BoatStatus,
    pub current_movement: Option<Movement>,
    pub movements: Vec<Movement>,
}

impl BoatDetail {
    pub fn new(boat: Boat, movements: Vec<Movement>) -> Self {
        let current_movement = movements.iter().find(|m| m.is_active).cloned();
        let status = BoatStatus::derive(current_movement.is_some());
        Self {
            boat,
            status,
            current_movement,
            movements,
        }
    }
}

/// A movement joined with its owning boat, as shown in the journal
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MovementWithBoat {
    #[serde(flatten)]
    pub movement: Movement,
    pub boat: Boat,
}

/// Journal filter set; also used unpaginated for the CSV export
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JournalFilter {
    /// Lower bound (inclusive) on the arrival timestamp
    pub date_from: Option<DateTime<Utc>>,
    /// Upper bound (inclusive) on the arrival timestamp
    pub date_to: Option<DateTime<Utc>>,
    /// Substring match against the owning boat's serial number or name
    pub query: Option<String>,
    /// Substring match against the berth identifier
    pub berth: Option<String>,
    pub source: Option<MovementSource>,
    pub kind: Option<MovementKind>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub total_pages: u64,
}

impl Pagination {
    pub fn new(page: u32, limit: u32, total: u64) -> Self {
        let total_pages = total.div_ceil(limit as u64);
        Self {
            page,
            limit,
            total,
            total_pages,
        }
    }
}

/// One page of the movement journal
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MovementPage {
    pub movements: Vec<MovementWithBoat>,
    pub pagination: Pagination,
}

/// Aggregate counts and recent activity
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PortStats {
    pub total_boats: i64,
    pub at_berth: i64,
    pub departed: i64,
    pub total_movements: i64,
    pub active_movements: i64,
    pub recent_arrivals: Vec<MovementWithBoat>,
    pub recent_departures: Vec<MovementWithBoat>,
}

/// UTF-8 byte-order-mark, so spreadsheet software picks up the encoding
const CSV_BOM: &str = "\u{feff}";

const CSV_HEADERS: [&str; 14] = [
    "Movement ID",
    "Serial Number",
    "Boat Name",
    "Flag",
    "Boat Type",
    "Movement Kind",
    "Arrival (UTC)",
    "Arrival (Local)",
    "Departure (UTC)",
    "Departure (Local)",
    "Berth",
    "Source",
    "Status",
    "Notes",
];

/// Render movements as a CSV document: BOM, one header row, one row per
/// movement, every cell double-quote escaped.
pub fn movements_to_csv(movements: &[MovementWithBoat]) -> String {
    let mut lines = Vec::with_capacity(movements.len() + 1);
    lines.push(csv_row(CSV_HEADERS.iter().map(|h| h.to_string())));

    for entry in movements {
        let movement = &entry.movement;
        let boat = &entry.boat;
        lines.push(csv_row(
            [
                movement.id.to_string(),
                boat.serial_number.clone(),
                boat.name.clone(),
                boat.flag.clone().unwrap_or_default(),
                boat.boat_type.clone().unwrap_or_default(),
                movement.kind.as_str().to_string(),
                format_utc(&movement.arrival_at),
                format_local(&movement.arrival_at),
                movement.departure_at.as_ref().map(format_utc).unwrap_or_default(),
                movement.departure_at.as_ref().map(format_local).unwrap_or_default(),
                movement.berth.clone().unwrap_or_default(),
                movement.source.as_str().to_string(),
                if movement.is_active { "Active" } else { "Completed" }.to_string(),
                movement.notes.clone().unwrap_or_default(),
            ]
            .into_iter(),
        ));
    }

    format!("{CSV_BOM}{}", lines.join("\n"))
}

fn csv_row(cells: impl Iterator<Item = String>) -> String {
    cells
        .map(|cell| format!("\"{}\"", cell.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(",")
}

fn format_utc(instant: &DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Local rendering for display only; comparisons always use the UTC instant.
fn format_local(instant: &DateTime<Utc>) -> String {
    instant.with_timezone(&Paris).format("%d/%m/%Y %H:%M").to_string()
}
