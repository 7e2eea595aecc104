use crate::{datetime_from_db_text, datetime_to_db_text, DbError, DbPool};
use chrono::{DateTime, Utc};
use sqlx::Row;
use tandem_models::pairing::PairingStatus;

#[derive(Debug, Clone)]
pub struct PairingRow {
    pub id: i64,
    pub requester_id: i64,
    pub recipient_id: i64,
    pub status: PairingStatus,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl PairingRow {
    /// The other party of this pairing, from `user_id`'s point of view.
    pub fn partner_of(&self, user_id: i64) -> i64 {
        if self.requester_id == user_id {
            self.recipient_id
        } else {
            self.requester_id
        }
    }
}

impl<'r> sqlx::FromRow<'r, sqlx::any::AnyRow> for PairingRow {
    fn from_row(row: &'r sqlx::any::AnyRow) -> Result<Self, sqlx::Error> {
        let status_raw: String = row.try_get("status")?;
        let created_at_raw: String = row.try_get("created_at")?;
        let resolved_at_raw: Option<String> = row.try_get("resolved_at")?;
        Ok(Self {
            id: row.try_get("id")?,
            requester_id: row.try_get("requester_id")?,
            recipient_id: row.try_get("recipient_id")?,
            status: PairingStatus::parse(&status_raw).ok_or_else(|| {
                sqlx::Error::Protocol(format!("invalid pairing status '{status_raw}'"))
            })?,
            created_at: datetime_from_db_text(&created_at_raw)?,
            resolved_at: resolved_at_raw
                .as_deref()
                .map(datetime_from_db_text)
                .transpose()?,
        })
    }
}

const PAIRING_COLUMNS: &str =
    "id, requester_id, recipient_id, status, created_at, resolved_at";

pub async fn create_pairing(
    pool: &DbPool,
    id: i64,
    requester_id: i64,
    recipient_id: i64,
) -> Result<PairingRow, DbError> {
    let row = sqlx::query_as::<_, PairingRow>(
        "INSERT INTO pairings (id, requester_id, recipient_id, status, created_at)
         VALUES ($1, $2, $3, 'PENDING', $4)
         RETURNING id, requester_id, recipient_id, status, created_at, resolved_at",
    )
    .bind(id)
    .bind(requester_id)
    .bind(recipient_id)
    .bind(datetime_to_db_text(Utc::now()))
    .fetch_one(pool)
    .await?;
    Ok(row)
}

pub async fn get_pairing(pool: &DbPool, id: i64) -> Result<Option<PairingRow>, DbError> {
    let row = sqlx::query_as::<_, PairingRow>(&format!(
        "SELECT {PAIRING_COLUMNS} FROM pairings WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// The user's single ACCEPTED pairing, in either direction.
pub async fn get_active_pairing(
    pool: &DbPool,
    user_id: i64,
) -> Result<Option<PairingRow>, DbError> {
    let row = sqlx::query_as::<_, PairingRow>(&format!(
        "SELECT {PAIRING_COLUMNS} FROM pairings
         WHERE status = 'ACCEPTED' AND (requester_id = $1 OR recipient_id = $1)
         LIMIT 1"
    ))
    .bind(user_id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Any unresolved or accepted pairing between the two users, in either
/// direction. Used to block duplicate requests.
pub async fn get_open_pairing_between(
    pool: &DbPool,
    a: i64,
    b: i64,
) -> Result<Option<PairingRow>, DbError> {
    let row = sqlx::query_as::<_, PairingRow>(&format!(
        "SELECT {PAIRING_COLUMNS} FROM pairings
         WHERE status IN ('PENDING', 'ACCEPTED')
           AND ((requester_id = $1 AND recipient_id = $2)
             OR (requester_id = $2 AND recipient_id = $1))
         LIMIT 1"
    ))
    .bind(a)
    .bind(b)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Any PENDING or ACCEPTED pairing the user takes part in.
pub async fn get_open_pairing_for(
    pool: &DbPool,
    user_id: i64,
) -> Result<Option<PairingRow>, DbError> {
    let row = sqlx::query_as::<_, PairingRow>(&format!(
        "SELECT {PAIRING_COLUMNS} FROM pairings
         WHERE status IN ('PENDING', 'ACCEPTED')
           AND (requester_id = $1 OR recipient_id = $1)
         LIMIT 1"
    ))
    .bind(user_id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

pub async fn list_incoming_pending(
    pool: &DbPool,
    recipient_id: i64,
) -> Result<Vec<PairingRow>, DbError> {
    let rows = sqlx::query_as::<_, PairingRow>(&format!(
        "SELECT {PAIRING_COLUMNS} FROM pairings
         WHERE recipient_id = $1 AND status = 'PENDING'
         ORDER BY created_at ASC"
    ))
    .bind(recipient_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Resolve a PENDING pairing. The WHERE clause pins the recipient and the
/// PENDING state, so only the target user can resolve it and a resolved
/// pairing stays immutable. Accepting additionally requires that neither
/// party already holds an ACCEPTED pairing in either role; the check runs
/// inside the same statement, so two racing accepts cannot both pass. The
/// partial unique indexes on `pairings` back this up at the schema level.
/// Returns the updated row, or None if the guard did not match.
pub async fn resolve_pairing(
    pool: &DbPool,
    id: i64,
    recipient_id: i64,
    status: PairingStatus,
) -> Result<Option<PairingRow>, DbError> {
    let sql = if status == PairingStatus::Accepted {
        "UPDATE pairings
         SET status = $3, resolved_at = $4
         WHERE id = $1 AND recipient_id = $2 AND status = 'PENDING'
           AND NOT EXISTS (
               SELECT 1 FROM pairings other
               WHERE other.status = 'ACCEPTED'
                 AND (other.requester_id = pairings.requester_id
                   OR other.requester_id = pairings.recipient_id
                   OR other.recipient_id = pairings.requester_id
                   OR other.recipient_id = pairings.recipient_id)
           )
         RETURNING id, requester_id, recipient_id, status, created_at, resolved_at"
    } else {
        "UPDATE pairings
         SET status = $3, resolved_at = $4
         WHERE id = $1 AND recipient_id = $2 AND status = 'PENDING'
         RETURNING id, requester_id, recipient_id, status, created_at, resolved_at"
    };
    let row = sqlx::query_as::<_, PairingRow>(sql)
        .bind(id)
        .bind(recipient_id)
        .bind(status.as_str())
        .bind(datetime_to_db_text(Utc::now()))
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{create_pool, run_migrations};

    async fn pool_with_users(count: i64) -> DbPool {
        let pool = create_pool("sqlite::memory:", 1).await.expect("pool");
        run_migrations(&pool).await.expect("migrations");
        for id in 1..=count {
            crate::users::create_user(&pool, id, &format!("user{id}"), &format!("User {id}"), "hash")
                .await
                .expect("user");
        }
        pool
    }

    #[tokio::test]
    async fn second_accept_for_same_recipient_does_not_pass() {
        let pool = pool_with_users(3).await;
        create_pairing(&pool, 100, 2, 1).await.expect("pairing");
        create_pairing(&pool, 101, 3, 1).await.expect("pairing");

        let first = resolve_pairing(&pool, 100, 1, PairingStatus::Accepted)
            .await
            .expect("resolve");
        assert!(first.is_some());
        let second = resolve_pairing(&pool, 101, 1, PairingStatus::Accepted)
            .await
            .expect("resolve");
        assert!(second.is_none());

        let accepted: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM pairings
             WHERE status = 'ACCEPTED' AND (requester_id = $1 OR recipient_id = $2)",
        )
        .bind(1i64)
        .bind(1i64)
        .fetch_one(&pool)
        .await
        .expect("count");
        assert_eq!(accepted, 1);
    }

    #[tokio::test]
    async fn accept_does_not_pass_when_a_party_is_paired_in_the_other_role() {
        let pool = pool_with_users(3).await;
        // User 1 requested pairing 100 and is the recipient of pairing 101.
        create_pairing(&pool, 100, 1, 2).await.expect("pairing");
        create_pairing(&pool, 101, 3, 1).await.expect("pairing");

        let first = resolve_pairing(&pool, 100, 2, PairingStatus::Accepted)
            .await
            .expect("resolve");
        assert!(first.is_some());
        let second = resolve_pairing(&pool, 101, 1, PairingStatus::Accepted)
            .await
            .expect("resolve");
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn resolved_pairing_stays_immutable() {
        let pool = pool_with_users(2).await;
        create_pairing(&pool, 100, 1, 2).await.expect("pairing");

        resolve_pairing(&pool, 100, 2, PairingStatus::Rejected)
            .await
            .expect("resolve")
            .expect("row");
        let again = resolve_pairing(&pool, 100, 2, PairingStatus::Accepted)
            .await
            .expect("resolve");
        assert!(again.is_none());
    }
}
