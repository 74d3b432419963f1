//! `PostgreSQL` registration store for Rollcall.
//!
//! Implements [`RegistrationStore`] on top of a sqlx connection pool:
//!
//! - One database transaction per [`StoreTransaction`], rolled back on drop
//! - Capacity decisions serialised by `SELECT … FOR UPDATE` on the event row
//! - `UNIQUE (event_id, volunteer_id)` reported as [`StoreError::Duplicate`]
//! - Serialization failures and deadlocks reported as [`StoreError::Conflict`]
//!
//! # Example
//!
//! ```no_run
//! use rollcall_postgres::PostgresRegistrationStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = PostgresRegistrationStore::connect("postgres://localhost/rollcall").await?;
//! store.migrate().await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]

use chrono::{DateTime, NaiveDate, Utc};
use rollcall_core::store::{RegistrationStore, StoreError, StoreFuture, StoreTransaction};
use rollcall_core::types::{
    Event, EventId, NewEvent, NewRegistration, Registration, RegistrationId, RegistrationStatus,
    UserId,
};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row};
use uuid::Uuid;

const EVENT_COLUMNS: &str =
    "id, name, description, event_date, place, volunteers_required, organizer_id, created_at";
const REGISTRATION_COLUMNS: &str = "id, event_id, volunteer_id, contact, status, created_at";

/// SQLSTATE codes for aborts that succeed when the transaction is retried.
const SERIALIZATION_FAILURE: &str = "40001";
const DEADLOCK_DETECTED: &str = "40P01";

/// `PostgreSQL`-backed registration store.
#[derive(Clone, Debug)]
pub struct PostgresRegistrationStore {
    pool: PgPool,
}

impl PostgresRegistrationStore {
    /// Create a store over an existing connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect to `database_url` with default pool settings.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the connection fails.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPool::connect(database_url).await.map_err(map_sqlx_error)?;
        Ok(Self::new(pool))
    }

    /// The underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run database migrations.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if a migration fails.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Database(format!("Migration failed: {e}")))?;
        Ok(())
    }
}

impl RegistrationStore for PostgresRegistrationStore {
    fn begin(&self) -> StoreFuture<'_, Box<dyn StoreTransaction>> {
        Box::pin(async move {
            let tx = self.pool.begin().await.map_err(map_sqlx_error)?;
            Ok(Box::new(PostgresTransaction { tx }) as Box<dyn StoreTransaction>)
        })
    }
}

/// One `PostgreSQL` transaction. Dropping it without commit rolls back.
struct PostgresTransaction {
    tx: sqlx::Transaction<'static, Postgres>,
}

impl PostgresTransaction {
    async fn fetch_event(
        &mut self,
        event_id: EventId,
        for_update: bool,
    ) -> Result<Option<Event>, StoreError> {
        let lock = if for_update { " FOR UPDATE" } else { "" };
        let sql = format!("SELECT {EVENT_COLUMNS} FROM events WHERE id = $1{lock}");

        let row = sqlx::query(&sql)
            .bind(*event_id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(map_sqlx_error)?;

        row.as_ref().map(row_to_event).transpose()
    }

    async fn fetch_registration(
        &mut self,
        registration_id: RegistrationId,
        for_update: bool,
    ) -> Result<Option<Registration>, StoreError> {
        let lock = if for_update { " FOR UPDATE" } else { "" };
        let sql = format!("SELECT {REGISTRATION_COLUMNS} FROM registrations WHERE id = $1{lock}");

        let row = sqlx::query(&sql)
            .bind(*registration_id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(map_sqlx_error)?;

        row.as_ref().map(row_to_registration).transpose()
    }
}

impl StoreTransaction for PostgresTransaction {
    fn get_event(&mut self, event_id: EventId) -> StoreFuture<'_, Option<Event>> {
        Box::pin(self.fetch_event(event_id, false))
    }

    fn lock_event(&mut self, event_id: EventId) -> StoreFuture<'_, Option<Event>> {
        Box::pin(self.fetch_event(event_id, true))
    }

    fn insert_event(&mut self, event: NewEvent) -> StoreFuture<'_, Event> {
        Box::pin(async move {
            let capacity = i32::try_from(event.capacity).map_err(|_| {
                StoreError::Database(format!("capacity {} out of range", event.capacity))
            })?;

            sqlx::query(
                r"
                INSERT INTO events
                    (id, name, description, event_date, place, volunteers_required, organizer_id, created_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                ",
            )
            .bind(*event.id.as_uuid())
            .bind(&event.name)
            .bind(&event.description)
            .bind(event.date)
            .bind(&event.place)
            .bind(capacity)
            .bind(*event.organizer_id.as_uuid())
            .bind(event.created_at)
            .execute(&mut *self.tx)
            .await
            .map_err(map_sqlx_error)?;

            Ok(event.into_event())
        })
    }

    fn update_event(&mut self, event: Event) -> StoreFuture<'_, bool> {
        Box::pin(async move {
            let result = sqlx::query(
                r"
                UPDATE events
                SET name = $2, description = $3, event_date = $4, place = $5
                WHERE id = $1
                ",
            )
            .bind(*event.id.as_uuid())
            .bind(&event.name)
            .bind(&event.description)
            .bind(event.date)
            .bind(&event.place)
            .execute(&mut *self.tx)
            .await
            .map_err(map_sqlx_error)?;

            Ok(result.rows_affected() > 0)
        })
    }

    fn list_upcoming_events(&mut self, from: NaiveDate) -> StoreFuture<'_, Vec<(Event, u32)>> {
        Box::pin(async move {
            let rows = sqlx::query(
                r"
                SELECT e.id, e.name, e.description, e.event_date, e.place,
                       e.volunteers_required, e.organizer_id, e.created_at,
                       COUNT(r.id) FILTER (WHERE r.status = 'accepted') AS accepted_count
                FROM events e
                LEFT JOIN registrations r ON r.event_id = e.id
                WHERE e.event_date >= $1
                GROUP BY e.id
                ORDER BY e.event_date ASC, e.created_at ASC, e.id ASC
                ",
            )
            .bind(from)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(map_sqlx_error)?;

            rows.iter()
                .map(|row| -> Result<(Event, u32), StoreError> {
                    let accepted: i64 = row
                        .try_get("accepted_count")
                        .map_err(|e| corrupt("accepted_count", e))?;
                    let accepted =
                        u32::try_from(accepted).map_err(|e| corrupt("accepted_count", e))?;
                    Ok((row_to_event(row)?, accepted))
                })
                .collect()
        })
    }

    fn delete_event(&mut self, event_id: EventId) -> StoreFuture<'_, Option<u64>> {
        Box::pin(async move {
            if self.fetch_event(event_id, true).await?.is_none() {
                return Ok(None);
            }

            let removed = sqlx::query("DELETE FROM registrations WHERE event_id = $1")
                .bind(*event_id.as_uuid())
                .execute(&mut *self.tx)
                .await
                .map_err(map_sqlx_error)?
                .rows_affected();

            sqlx::query("DELETE FROM events WHERE id = $1")
                .bind(*event_id.as_uuid())
                .execute(&mut *self.tx)
                .await
                .map_err(map_sqlx_error)?;

            Ok(Some(removed))
        })
    }

    fn get_registration(
        &mut self,
        registration_id: RegistrationId,
    ) -> StoreFuture<'_, Option<Registration>> {
        Box::pin(self.fetch_registration(registration_id, false))
    }

    fn lock_registration(
        &mut self,
        registration_id: RegistrationId,
    ) -> StoreFuture<'_, Option<Registration>> {
        Box::pin(self.fetch_registration(registration_id, true))
    }

    fn find_registration(
        &mut self,
        event_id: EventId,
        volunteer_id: UserId,
    ) -> StoreFuture<'_, Option<Registration>> {
        Box::pin(async move {
            let sql = format!(
                "SELECT {REGISTRATION_COLUMNS} FROM registrations WHERE event_id = $1 AND volunteer_id = $2"
            );
            let row = sqlx::query(&sql)
                .bind(*event_id.as_uuid())
                .bind(*volunteer_id.as_uuid())
                .fetch_optional(&mut *self.tx)
                .await
                .map_err(map_sqlx_error)?;

            row.as_ref().map(row_to_registration).transpose()
        })
    }

    fn create_registration(
        &mut self,
        registration: NewRegistration,
    ) -> StoreFuture<'_, Registration> {
        Box::pin(async move {
            sqlx::query(
                r"
                INSERT INTO registrations (id, event_id, volunteer_id, contact, status, created_at)
                VALUES ($1, $2, $3, $4, $5, $6)
                ",
            )
            .bind(*registration.id.as_uuid())
            .bind(*registration.event_id.as_uuid())
            .bind(*registration.volunteer_id.as_uuid())
            .bind(&registration.contact)
            .bind(RegistrationStatus::Pending.as_str())
            .bind(registration.created_at)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| {
                if let sqlx::Error::Database(db_err) = &e {
                    if db_err.is_unique_violation() {
                        return StoreError::Duplicate {
                            event_id: registration.event_id,
                            volunteer_id: registration.volunteer_id,
                        };
                    }
                }
                map_sqlx_error(e)
            })?;

            Ok(registration.into_registration())
        })
    }

    fn count_by_status(
        &mut self,
        event_id: EventId,
        status: RegistrationStatus,
    ) -> StoreFuture<'_, u32> {
        Box::pin(async move {
            let (count,): (i64,) = sqlx::query_as(
                "SELECT COUNT(*) FROM registrations WHERE event_id = $1 AND status = $2",
            )
            .bind(*event_id.as_uuid())
            .bind(status.as_str())
            .fetch_one(&mut *self.tx)
            .await
            .map_err(map_sqlx_error)?;

            u32::try_from(count).map_err(|_| StoreError::Corrupt(format!("count {count}")))
        })
    }

    fn set_status(
        &mut self,
        registration_id: RegistrationId,
        status: RegistrationStatus,
    ) -> StoreFuture<'_, bool> {
        Box::pin(async move {
            let result = sqlx::query("UPDATE registrations SET status = $2 WHERE id = $1")
                .bind(*registration_id.as_uuid())
                .bind(status.as_str())
                .execute(&mut *self.tx)
                .await
                .map_err(map_sqlx_error)?;

            Ok(result.rows_affected() > 0)
        })
    }

    fn bulk_set_status(
        &mut self,
        event_id: EventId,
        from: RegistrationStatus,
        to: RegistrationStatus,
    ) -> StoreFuture<'_, u64> {
        Box::pin(async move {
            let result = sqlx::query(
                "UPDATE registrations SET status = $3 WHERE event_id = $1 AND status = $2",
            )
            .bind(*event_id.as_uuid())
            .bind(from.as_str())
            .bind(to.as_str())
            .execute(&mut *self.tx)
            .await
            .map_err(map_sqlx_error)?;

            tracing::debug!(
                %event_id,
                from = from.as_str(),
                to = to.as_str(),
                rows = result.rows_affected(),
                "Bulk status update"
            );
            Ok(result.rows_affected())
        })
    }

    fn list_registrations(
        &mut self,
        event_id: EventId,
        status: Option<RegistrationStatus>,
    ) -> StoreFuture<'_, Vec<Registration>> {
        Box::pin(async move {
            let sql = format!(
                "SELECT {REGISTRATION_COLUMNS} FROM registrations \
                 WHERE event_id = $1 AND ($2::text IS NULL OR status = $2) \
                 ORDER BY created_at ASC, id ASC"
            );
            let rows = sqlx::query(&sql)
                .bind(*event_id.as_uuid())
                .bind(status.map(|s| s.as_str()))
                .fetch_all(&mut *self.tx)
                .await
                .map_err(map_sqlx_error)?;

            rows.iter().map(row_to_registration).collect()
        })
    }

    fn delete_registrations_for_volunteer(
        &mut self,
        volunteer_id: UserId,
    ) -> StoreFuture<'_, u64> {
        Box::pin(async move {
            let result = sqlx::query("DELETE FROM registrations WHERE volunteer_id = $1")
                .bind(*volunteer_id.as_uuid())
                .execute(&mut *self.tx)
                .await
                .map_err(map_sqlx_error)?;

            Ok(result.rows_affected())
        })
    }

    fn commit(self: Box<Self>) -> StoreFuture<'static, ()> {
        Box::pin(async move { self.tx.commit().await.map_err(map_sqlx_error) })
    }
}

/// Classify a sqlx error.
fn map_sqlx_error(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        if matches!(
            db_err.code().as_deref(),
            Some(SERIALIZATION_FAILURE | DEADLOCK_DETECTED)
        ) {
            return StoreError::Conflict(db_err.message().to_string());
        }
    }
    StoreError::Database(err.to_string())
}

fn corrupt(column: &str, err: impl std::fmt::Display) -> StoreError {
    StoreError::Corrupt(format!("{column}: {err}"))
}

fn row_to_event(row: &PgRow) -> Result<Event, StoreError> {
    let id: Uuid = row.try_get("id").map_err(|e| corrupt("id", e))?;
    let name: String = row.try_get("name").map_err(|e| corrupt("name", e))?;
    let description: String = row
        .try_get("description")
        .map_err(|e| corrupt("description", e))?;
    let date: NaiveDate = row
        .try_get("event_date")
        .map_err(|e| corrupt("event_date", e))?;
    let place: String = row.try_get("place").map_err(|e| corrupt("place", e))?;
    let capacity: i32 = row
        .try_get("volunteers_required")
        .map_err(|e| corrupt("volunteers_required", e))?;
    let organizer_id: Uuid = row
        .try_get("organizer_id")
        .map_err(|e| corrupt("organizer_id", e))?;
    let created_at: DateTime<Utc> = row
        .try_get("created_at")
        .map_err(|e| corrupt("created_at", e))?;

    Ok(Event {
        id: EventId::from_uuid(id),
        name,
        description,
        date,
        place,
        capacity: u32::try_from(capacity).map_err(|e| corrupt("volunteers_required", e))?,
        organizer_id: UserId::from_uuid(organizer_id),
        created_at,
    })
}

fn row_to_registration(row: &PgRow) -> Result<Registration, StoreError> {
    let id: Uuid = row.try_get("id").map_err(|e| corrupt("id", e))?;
    let event_id: Uuid = row.try_get("event_id").map_err(|e| corrupt("event_id", e))?;
    let volunteer_id: Uuid = row
        .try_get("volunteer_id")
        .map_err(|e| corrupt("volunteer_id", e))?;
    let contact: String = row.try_get("contact").map_err(|e| corrupt("contact", e))?;
    let status: String = row.try_get("status").map_err(|e| corrupt("status", e))?;
    let created_at: DateTime<Utc> = row
        .try_get("created_at")
        .map_err(|e| corrupt("created_at", e))?;

    Ok(Registration {
        id: RegistrationId::from_uuid(id),
        event_id: EventId::from_uuid(event_id),
        volunteer_id: UserId::from_uuid(volunteer_id),
        contact,
        status: status.parse().map_err(|e| corrupt("status", e))?,
        created_at,
    })
}
