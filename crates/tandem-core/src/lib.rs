pub mod auth;
pub mod directory;
pub mod error;
pub mod pairing;
pub mod registry;
pub mod rooms;
pub mod router;
pub mod store;

use directory::{PairingDirectory, SqlPairingDirectory};
use registry::SessionRegistry;
use rooms::RoomMembership;
use router::MessageRouter;
use std::sync::Arc;
use store::{MessageStore, SqlMessageStore};
use tandem_db::DbPool;

/// Shared handle threaded through the HTTP layer and the gateway. Every
/// piece of live state hangs off this; there are no globals.
#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub config: AppConfig,
    pub registry: Arc<SessionRegistry>,
    pub rooms: Arc<RoomMembership>,
    pub store: Arc<dyn MessageStore>,
    pub directory: Arc<dyn PairingDirectory>,
    pub router: Arc<MessageRouter>,
}

impl AppState {
    pub fn new(db: DbPool, config: AppConfig) -> Self {
        let registry = Arc::new(SessionRegistry::new());
        let rooms = Arc::new(RoomMembership::new());
        let store: Arc<dyn MessageStore> =
            Arc::new(SqlMessageStore::new(db.clone(), config.worker_id));
        let directory: Arc<dyn PairingDirectory> = Arc::new(SqlPairingDirectory::new(db.clone()));
        let router = Arc::new(MessageRouter::new(
            registry.clone(),
            rooms.clone(),
            store.clone(),
        ));
        Self {
            db,
            config,
            registry,
            rooms,
            store,
            directory,
            router,
        }
    }
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub jwt_secret: String,
    pub jwt_expiry_seconds: u64,
    pub registration_enabled: bool,
    pub database_url: String,
    /// Snowflake worker id for this process.
    pub worker_id: u16,
    /// Per-user cap on typing indicator frames.
    pub typing_events_per_minute: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            jwt_expiry_seconds: 86_400 * 7,
            registration_enabled: true,
            database_url: "sqlite://tandem.db".to_string(),
            worker_id: 1,
            typing_events_per_minute: 60,
        }
    }
}
