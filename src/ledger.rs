//! The movement ledger: arrival/departure state transitions.
//!
//! Rules enforced here and in the store:
//! - at most one active movement per boat; a second arrival is a conflict
//! - a departure requires an active movement and must not precede its arrival
//! - boats are upserted by serial number, never duplicated
//!
//! Audit entries are appended after the transaction commits and are
//! fire-and-forget with respect to the caller's response.

use chrono::Utc;
use serde_json::json;
use tracing::{info, warn};

use crate::audit::{Actor, AuditSink};
use crate::database::Database;
use crate::errors::RecorderError;
use crate::models::{AuditAction, AuditEntry, Boat, Movement, NewArrival, NewDeparture};

#[derive(Clone)]
pub struct Ledger {
    db: Database,
    audit: AuditSink,
}

impl Ledger {
    pub fn new(db: Database) -> Self {
        let audit = AuditSink::new(db.clone());
        Self { db, audit }
    }

    /// Record an arrival. The arrival instant is computed here, at call time.
    pub async fn record_arrival(
        &self,
        arrival: NewArrival,
        actor: Actor,
    ) -> Result<(Boat, Movement), RecorderError> {
        let now = Utc::now();
        let result = self.db.record_arrival(&arrival, now).await;

        match &result {
            Ok((boat, movement)) => {
                info!(
                    boat_id = boat.id,
                    movement_id = movement.id,
                    serial_number = %boat.serial_number,
                    "Arrival recorded"
                );
                self.audit.record(AuditEntry {
                    action: AuditAction::Arrival,
                    entity: "Movement".to_string(),
                    entity_id: movement.id.to_string(),
                    changes: Some(json!({
                        "serialNumber": boat.serial_number,
                        "arrivalAt": movement.arrival_at,
                    })),
                    ip_address: actor.ip_address,
                    user_agent: actor.user_agent,
                });
            }
            Err(RecorderError::AlreadyActive) => {
                warn!(
                    serial_number = %arrival.serial_number,
                    "Arrival rejected: boat already has an active movement"
                );
            }
            Err(_) => {}
        }

        result
    }

    /// Record a departure. The departure instant is computed here, at call
    /// time; backdated departures are not supported.
    pub async fn record_departure(
        &self,
        departure: NewDeparture,
        actor: Actor,
    ) -> Result<(Boat, Movement), RecorderError> {
        let now = Utc::now();
        let result = self.db.record_departure(&departure, now).await;

        match &result {
            Ok((boat, movement)) => {
                info!(
                    boat_id = boat.id,
                    movement_id = movement.id,
                    serial_number = %boat.serial_number,
                    "Departure recorded"
                );
                self.audit.record(AuditEntry {
                    action: AuditAction::Departure,
                    entity: "Movement".to_string(),
                    entity_id: movement.id.to_string(),
                    changes: Some(json!({
                        "serialNumber": boat.serial_number,
                        "departureAt": movement.departure_at,
                    })),
                    ip_address: actor.ip_address,
                    user_agent: actor.user_agent,
                });
            }
            Err(RecorderError::BoatNotFound | RecorderError::NoActiveMovement) => {
                warn!(
                    serial_number = %departure.serial_number,
                    "Departure rejected: no boat or no active movement"
                );
            }
            Err(_) => {}
        }

        result
    }
}
