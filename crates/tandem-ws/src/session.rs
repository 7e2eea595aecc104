use tandem_models::UserId;
use uuid::Uuid;

/// Per-connection state established by a successful `login` event.
pub struct Session {
    pub user_id: UserId,
    pub user_name: String,
    pub conn_id: Uuid,
}

impl Session {
    pub fn new(user_id: UserId, user_name: String, conn_id: Uuid) -> Self {
        Self {
            user_id,
            user_name,
            conn_id,
        }
    }
}
