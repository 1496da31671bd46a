pub mod auth;
pub mod conversation;
pub mod error;
pub mod events;
pub mod message;
pub mod presence;
pub mod rooms;

use std::sync::Arc;
use tokio::sync::Notify;

use lobby_db::DbPool;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub jwt_secret: String,
    pub jwt_expiry_seconds: u64,
}

#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub event_bus: events::EventBus,
    /// Who is connected right now. Process lifetime; rebuilt empty on restart.
    pub presence: Arc<presence::PresenceRegistry>,
    /// conversation id -> sessions currently viewing it.
    pub rooms: Arc<rooms::RoomRouter>,
    pub config: AppConfig,
    pub shutdown: Arc<Notify>,
}

impl AppState {
    pub fn new(db: DbPool, config: AppConfig) -> Self {
        Self {
            db,
            event_bus: events::EventBus::default(),
            presence: Arc::new(presence::PresenceRegistry::new()),
            rooms: Arc::new(rooms::RoomRouter::new()),
            config,
            shutdown: Arc::new(Notify::new()),
        }
    }
}
