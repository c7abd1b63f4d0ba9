//! Persistence for boats, movements and the audit log.
//!
//! All ledger mutations run inside a single transaction per request. The
//! application-level "is an active movement already present" check is backed
//! by a partial unique index on `movements(boat_id) WHERE is_active = 1`, so
//! a concurrent duplicate arrival that slips past the check still fails to
//! commit and is reported as a conflict.

use std::collections::HashMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use tracing::info;

use crate::errors::RecorderError;
use crate::models::{AuditEntry, Boat, Movement, NewArrival, NewDeparture, SerialNumber};
use crate::views::{
    BoatDetail, BoatWithMovement, JournalFilter, MovementPage, MovementWithBoat, Pagination,
    PortStats,
};

const BOAT_COLUMNS: &str =
    "id, serial_number, name, flag, boat_type, capacity, length_m, remarks, created_at, updated_at";

const MOVEMENT_COLUMNS: &str =
    "id, boat_id, kind, arrival_at, departure_at, berth, source, notes, is_active, created_at";

const MOVEMENT_BOAT_SELECT: &str = "SELECT m.id, m.boat_id, m.kind, m.arrival_at, m.departure_at, \
     m.berth, m.source, m.notes, m.is_active, m.created_at, \
     b.id AS b_id, b.serial_number AS b_serial_number, b.name AS b_name, b.flag AS b_flag, \
     b.boat_type AS b_boat_type, b.capacity AS b_capacity, b.length_m AS b_length_m, \
     b.remarks AS b_remarks, b.created_at AS b_created_at, b.updated_at AS b_updated_at \
     FROM movements m JOIN boats b ON b.id = m.boat_id";

const MOVEMENT_COUNT_SELECT: &str =
    "SELECT COUNT(*) FROM movements m JOIN boats b ON b.id = m.boat_id";

/// Flat row shape for the movement/boat join
#[derive(Debug, sqlx::FromRow)]
struct MovementBoatRow {
    id: i64,
    boat_id: i64,
    kind: crate::models::MovementKind,
    arrival_at: DateTime<Utc>,
    departure_at: Option<DateTime<Utc>>,
    berth: Option<String>,
    source: crate::models::MovementSource,
    notes: Option<String>,
    is_active: bool,
    created_at: DateTime<Utc>,
    b_id: i64,
    b_serial_number: String,
    b_name: String,
    b_flag: Option<String>,
    b_boat_type: Option<String>,
    b_capacity: Option<i64>,
    b_length_m: Option<f64>,
    b_remarks: Option<String>,
    b_created_at: DateTime<Utc>,
    b_updated_at: DateTime<Utc>,
}

impl From<MovementBoatRow> for MovementWithBoat {
    fn from(row: MovementBoatRow) -> Self {
        MovementWithBoat {
            movement: Movement {
                id: row.id,
                boat_id: row.boat_id,
                kind: row.kind,
                arrival_at: row.arrival_at,
                departure_at: row.departure_at,
                berth: row.berth,
                source: row.source,
                notes: row.notes,
                is_active: row.is_active,
                created_at: row.created_at,
            },
            boat: Boat {
                id: row.b_id,
                serial_number: row.b_serial_number,
                name: row.b_name,
                flag: row.b_flag,
                boat_type: row.b_boat_type,
                capacity: row.b_capacity,
                length_m: row.b_length_m,
                remarks: row.b_remarks,
                created_at: row.b_created_at,
                updated_at: row.b_updated_at,
            },
        }
    }
}

/// Database access for the berth recorder
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open a database from a SQLite URL, creating the file if needed,
    /// and apply pending migrations.
    pub async fn from_url(url: &str) -> Result<Self, RecorderError> {
        info!("Opening database at {url}");
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| RecorderError::DatabaseConnectionError(e.to_string()))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| RecorderError::DatabaseConnectionError(e.to_string()))?;

        Self::new(pool).await
    }

    /// Wrap an existing pool and apply pending migrations
    pub async fn new(pool: SqlitePool) -> Result<Self, RecorderError> {
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| RecorderError::MigrationError(e.to_string()))?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Look up a boat by canonical serial number
    pub async fn find_boat(
        &self,
        serial_number: &SerialNumber,
    ) -> Result<Option<Boat>, RecorderError> {
        let boat = sqlx::query_as(&format!(
            "SELECT {BOAT_COLUMNS} FROM boats WHERE serial_number = ?1"
        ))
        .bind(serial_number.as_str())
        .fetch_optional(&self.pool)
        .await?;
        Ok(boat)
    }

    /// The single active movement of a boat, if any
    pub async fn active_movement(&self, boat_id: i64) -> Result<Option<Movement>, RecorderError> {
        let movement = sqlx::query_as(&format!(
            "SELECT {MOVEMENT_COLUMNS} FROM movements WHERE boat_id = ?1 AND is_active = 1"
        ))
        .bind(boat_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(movement)
    }

    /// Record an arrival: upsert the boat by serial number and open a new
    /// active movement, atomically.
    ///
    /// Fails with [`RecorderError::AlreadyActive`] when the boat already has
    /// an active movement, leaving all records untouched.
    pub async fn record_arrival(
        &self,
        arrival: &NewArrival,
        now: DateTime<Utc>,
    ) -> Result<(Boat, Movement), RecorderError> {
        let mut tx = self.pool.begin().await?;

        let active: Option<i64> = sqlx::query_scalar(
            "SELECT m.id FROM movements m JOIN boats b ON b.id = m.boat_id \
             WHERE b.serial_number = ?1 AND m.is_active = 1",
        )
        .bind(arrival.serial_number.as_str())
        .fetch_optional(&mut *tx)
        .await?;
        if active.is_some() {
            return Err(RecorderError::AlreadyActive);
        }

        // Identity (serial number, created_at) is never changed on update.
        let boat: Boat = sqlx::query_as(&format!(
            "INSERT INTO boats (serial_number, name, flag, boat_type, capacity, length_m, \
             remarks, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8) \
             ON CONFLICT (serial_number) DO UPDATE SET \
             name = excluded.name, flag = excluded.flag, boat_type = excluded.boat_type, \
             capacity = excluded.capacity, length_m = excluded.length_m, \
             remarks = excluded.remarks, updated_at = excluded.updated_at \
             RETURNING {BOAT_COLUMNS}"
        ))
        .bind(arrival.serial_number.as_str())
        .bind(&arrival.name)
        .bind(&arrival.flag)
        .bind(&arrival.boat_type)
        .bind(arrival.capacity)
        .bind(arrival.length_m)
        .bind(&arrival.remarks)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        let movement: Movement = sqlx::query_as(&format!(
            "INSERT INTO movements (boat_id, kind, arrival_at, berth, source, notes, \
             is_active, created_at) \
             VALUES (?1, 'ARRIVAL', ?2, ?3, ?4, ?5, 1, ?2) \
             RETURNING {MOVEMENT_COLUMNS}"
        ))
        .bind(boat.id)
        .bind(now)
        .bind(&arrival.berth)
        .bind(arrival.source)
        .bind(&arrival.notes)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                RecorderError::AlreadyActive
            } else {
                RecorderError::from(e)
            }
        })?;

        tx.commit().await?;
        Ok((boat, movement))
    }

    /// Record a departure: stamp the departure timestamp on the active
    /// movement and clear its active flag, atomically.
    ///
    /// The departure instant is computed by the caller at call time;
    /// an instant before the movement's arrival is rejected.
    pub async fn record_departure(
        &self,
        departure: &NewDeparture,
        now: DateTime<Utc>,
    ) -> Result<(Boat, Movement), RecorderError> {
        let mut tx = self.pool.begin().await?;

        let boat: Boat = sqlx::query_as(&format!(
            "SELECT {BOAT_COLUMNS} FROM boats WHERE serial_number = ?1"
        ))
        .bind(departure.serial_number.as_str())
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(RecorderError::BoatNotFound)?;

        let active: Movement = sqlx::query_as(&format!(
            "SELECT {MOVEMENT_COLUMNS} FROM movements WHERE boat_id = ?1 AND is_active = 1"
        ))
        .bind(boat.id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(RecorderError::NoActiveMovement)?;

        if now < active.arrival_at {
            return Err(RecorderError::DepartureBeforeArrival);
        }

        // Notes are only overwritten when the departure supplies them.
        let movement: Movement = sqlx::query_as(&format!(
            "UPDATE movements SET departure_at = ?1, is_active = 0, \
             notes = COALESCE(?2, notes) WHERE id = ?3 \
             RETURNING {MOVEMENT_COLUMNS}"
        ))
        .bind(now)
        .bind(&departure.notes)
        .bind(active.id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok((boat, movement))
    }

    /// Boats currently at berth, newest-updated first, with their single
    /// active movement.
    pub async fn current_boats(&self) -> Result<Vec<BoatWithMovement>, RecorderError> {
        let rows: Vec<MovementBoatRow> = sqlx::query_as(&format!(
            "{MOVEMENT_BOAT_SELECT} WHERE m.is_active = 1 ORDER BY b.updated_at DESC"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(MovementWithBoat::from)
            .map(|entry| BoatWithMovement::new(entry.boat, Some(entry.movement)))
            .collect())
    }

    /// A boat with its full movement history, newest arrival first
    pub async fn boat_detail(
        &self,
        serial_number: &SerialNumber,
    ) -> Result<Option<BoatDetail>, RecorderError> {
        let Some(boat) = self.find_boat(serial_number).await? else {
            return Ok(None);
        };

        let movements: Vec<Movement> = sqlx::query_as(&format!(
            "SELECT {MOVEMENT_COLUMNS} FROM movements WHERE boat_id = ?1 \
             ORDER BY arrival_at DESC"
        ))
        .bind(boat.id)
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(BoatDetail::new(boat, movements)))
    }

    /// All boats with all movements, newest arrivals first
    pub async fn history(&self) -> Result<Vec<BoatDetail>, RecorderError> {
        let boats: Vec<Boat> = sqlx::query_as(&format!(
            "SELECT {BOAT_COLUMNS} FROM boats ORDER BY updated_at DESC"
        ))
        .fetch_all(&self.pool)
        .await?;

        let movements: Vec<Movement> = sqlx::query_as(&format!(
            "SELECT {MOVEMENT_COLUMNS} FROM movements ORDER BY arrival_at DESC"
        ))
        .fetch_all(&self.pool)
        .await?;

        let mut by_boat: HashMap<i64, Vec<Movement>> = HashMap::new();
        for movement in movements {
            by_boat.entry(movement.boat_id).or_default().push(movement);
        }

        Ok(boats
            .into_iter()
            .map(|boat| {
                let movements = by_boat.remove(&boat.id).unwrap_or_default();
                BoatDetail::new(boat, movements)
            })
            .collect())
    }

    /// Case- and diacritic-insensitive substring search over serial number,
    /// name, flag and type; at most `limit` results, newest-updated first.
    pub async fn search_boats(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<BoatWithMovement>, RecorderError> {
        let needle = crate::models::fold_for_search(query.trim());

        let boats: Vec<Boat> = sqlx::query_as(&format!(
            "SELECT {BOAT_COLUMNS} FROM boats ORDER BY updated_at DESC"
        ))
        .fetch_all(&self.pool)
        .await?;

        let mut results = Vec::new();
        for boat in boats {
            if results.len() >= limit {
                break;
            }
            let matches = [
                Some(boat.serial_number.as_str()),
                Some(boat.name.as_str()),
                boat.flag.as_deref(),
                boat.boat_type.as_deref(),
            ]
            .into_iter()
            .flatten()
            .any(|field| crate::models::fold_for_search(field).contains(&needle));

            if matches {
                let current = self.active_movement(boat.id).await?;
                results.push(BoatWithMovement::new(boat, current));
            }
        }
        Ok(results)
    }

    /// Aggregate counts plus the five most recent arrivals and departures
    pub async fn stats(&self) -> Result<PortStats, RecorderError> {
        let total_boats: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM boats")
            .fetch_one(&self.pool)
            .await?;
        let at_berth: i64 = sqlx::query_scalar(
            "SELECT COUNT(DISTINCT boat_id) FROM movements WHERE is_active = 1",
        )
        .fetch_one(&self.pool)
        .await?;
        let total_movements: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM movements")
            .fetch_one(&self.pool)
            .await?;
        let active_movements: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM movements WHERE is_active = 1")
                .fetch_one(&self.pool)
                .await?;

        let recent_arrivals: Vec<MovementBoatRow> = sqlx::query_as(&format!(
            "{MOVEMENT_BOAT_SELECT} WHERE m.kind = 'ARRIVAL' \
             ORDER BY m.arrival_at DESC LIMIT 5"
        ))
        .fetch_all(&self.pool)
        .await?;

        let recent_departures: Vec<MovementBoatRow> = sqlx::query_as(&format!(
            "{MOVEMENT_BOAT_SELECT} WHERE m.departure_at IS NOT NULL \
             ORDER BY m.departure_at DESC LIMIT 5"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(PortStats {
            total_boats,
            at_berth,
            departed: total_boats - at_berth,
            total_movements,
            active_movements,
            recent_arrivals: recent_arrivals.into_iter().map(Into::into).collect(),
            recent_departures: recent_departures.into_iter().map(Into::into).collect(),
        })
    }

    /// One page of the movement journal, newest arrivals first
    pub async fn journal(
        &self,
        filter: &JournalFilter,
        page: u32,
        limit: u32,
    ) -> Result<MovementPage, RecorderError> {
        let mut count_builder = QueryBuilder::new(MOVEMENT_COUNT_SELECT);
        push_journal_filters(&mut count_builder, filter);
        let total: i64 = count_builder
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await?;

        let mut builder = QueryBuilder::new(MOVEMENT_BOAT_SELECT);
        push_journal_filters(&mut builder, filter);
        builder.push(" ORDER BY m.arrival_at DESC LIMIT ");
        builder.push_bind(limit as i64);
        builder.push(" OFFSET ");
        builder.push_bind((page as i64 - 1) * limit as i64);

        let rows: Vec<MovementBoatRow> = builder.build_query_as().fetch_all(&self.pool).await?;

        Ok(MovementPage {
            movements: rows.into_iter().map(Into::into).collect(),
            pagination: Pagination::new(page, limit, total as u64),
        })
    }

    /// All movements matching the filter, unpaginated, for the CSV export
    pub async fn movements_matching(
        &self,
        filter: &JournalFilter,
    ) -> Result<Vec<MovementWithBoat>, RecorderError> {
        let mut builder = QueryBuilder::new(MOVEMENT_BOAT_SELECT);
        push_journal_filters(&mut builder, filter);
        builder.push(" ORDER BY m.arrival_at DESC");

        let rows: Vec<MovementBoatRow> = builder.build_query_as().fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Append one audit log entry
    pub async fn append_audit(
        &self,
        entry: &AuditEntry,
        now: DateTime<Utc>,
    ) -> Result<(), RecorderError> {
        let changes = entry
            .changes
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        sqlx::query(
            "INSERT INTO audit_log (action, entity, entity_id, changes, ip_address, \
             user_agent, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )
        .bind(entry.action.as_str())
        .bind(&entry.entity)
        .bind(&entry.entity_id)
        .bind(changes)
        .bind(&entry.ip_address)
        .bind(&entry.user_agent)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Number of audit log entries recorded so far
    pub async fn audit_count(&self) -> Result<i64, RecorderError> {
        let count = sqlx::query_scalar("SELECT COUNT(*) FROM audit_log")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

fn push_journal_filters(builder: &mut QueryBuilder<'_, Sqlite>, filter: &JournalFilter) {
    builder.push(" WHERE 1 = 1");
    if let Some(from) = filter.date_from {
        builder.push(" AND m.arrival_at >= ");
        builder.push_bind(from);
    }
    if let Some(to) = filter.date_to {
        builder.push(" AND m.arrival_at <= ");
        builder.push_bind(to);
    }
    if let Some(berth) = &filter.berth {
        builder.push(" AND m.berth LIKE ");
        builder.push_bind(format!("%{berth}%"));
    }
    if let Some(source) = filter.source {
        builder.push(" AND m.source = ");
        builder.push_bind(source);
    }
    if let Some(kind) = filter.kind {
        builder.push(" AND m.kind = ");
        builder.push_bind(kind);
    }
    if let Some(query) = &filter.query {
        let pattern = format!("%{query}%");
        builder.push(" AND (b.serial_number LIKE ");
        builder.push_bind(pattern.clone());
        builder.push(" OR b.name LIKE ");
        builder.push_bind(pattern);
        builder.push(")");
    }
}

fn is_unique_violation(error: &sqlx::Error) -> bool {
    matches!(
        error,
        sqlx::Error::Database(db)
            if matches!(db.kind(), sqlx::error::ErrorKind::UniqueViolation)
    )
}
