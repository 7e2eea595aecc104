use crate::error::CoreError;
use async_trait::async_trait;
use std::time::Duration;
use tandem_db::DbPool;
use tandem_models::{RoomId, UserId};

/// A user's active pairing, as seen by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActivePairing {
    pub room_id: RoomId,
    pub partner_id: UserId,
}

/// Read-side view of the pairing state. The gateway consults this to
/// authorize joins and sends; it never chooses partners itself.
#[async_trait]
pub trait PairingDirectory: Send + Sync {
    /// The ACCEPTED pairing the user belongs to, if any. The room id is the
    /// id of that pairing.
    async fn active_pairing(&self, user_id: UserId) -> Result<Option<ActivePairing>, CoreError>;

    /// Drop any cached pairing state for the user. Called when a pairing is
    /// accepted so gateway authorization picks up the change promptly.
    async fn invalidate(&self, user_id: UserId);

    async fn resolve_active_partner(&self, user_id: UserId) -> Result<Option<UserId>, CoreError> {
        Ok(self.active_pairing(user_id).await?.map(|p| p.partner_id))
    }

    async fn resolve_room_id(&self, user_id: UserId) -> Result<Option<RoomId>, CoreError> {
        Ok(self.active_pairing(user_id).await?.map(|p| p.room_id))
    }
}

/// SQL-backed directory with a short TTL cache in front. A socket event
/// burst (typing, rapid messages) authorizes against the cache instead of
/// hitting the pool per frame.
pub struct SqlPairingDirectory {
    pool: DbPool,
    cache: moka::future::Cache<UserId, Option<ActivePairing>>,
}

impl SqlPairingDirectory {
    pub fn new(pool: DbPool) -> Self {
        Self {
            pool,
            cache: moka::future::Cache::builder()
                .max_capacity(10_000)
                .time_to_live(Duration::from_secs(60))
                .build(),
        }
    }
}

#[async_trait]
impl PairingDirectory for SqlPairingDirectory {
    async fn active_pairing(&self, user_id: UserId) -> Result<Option<ActivePairing>, CoreError> {
        if let Some(cached) = self.cache.get(&user_id).await {
            return Ok(cached);
        }
        let pairing = tandem_db::pairings::get_active_pairing(&self.pool, user_id.0)
            .await?
            .map(|row| ActivePairing {
                room_id: RoomId(row.id),
                partner_id: UserId(row.partner_of(user_id.0)),
            });
        self.cache.insert(user_id, pairing).await;
        Ok(pairing)
    }

    async fn invalidate(&self, user_id: UserId) {
        self.cache.invalidate(&user_id).await;
    }
}
