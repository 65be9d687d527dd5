use std::sync::Arc;

use crate::chat::ChatRelay;
use crate::connection::ConnectionRegistry;
use crate::events::{EventBus, NotificationTrigger};
use crate::infrastructure::auth::{IdentityVerifier, JwtVerifier};
use crate::infrastructure::config::Settings;
use crate::notification::{
    DeliveryDispatcher, LogEmailSink, LogSmsSink, NotificationQueue, NotificationService,
    TemplateEngine, WebSocketSink,
};
use crate::session::{RoomIndex, SessionRoomManager};
use crate::store::MarketStore;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub verifier: Arc<dyn IdentityVerifier>,
    pub registry: Arc<ConnectionRegistry>,
    pub sessions: Arc<SessionRoomManager>,
    pub chat: Arc<ChatRelay>,
    pub notifications: Arc<NotificationService>,
    pub queue: Arc<NotificationQueue>,
    pub dispatcher: Arc<DeliveryDispatcher>,
    pub bus: Arc<EventBus>,
}

impl AppState {
    pub fn new(settings: Settings, store: Arc<dyn MarketStore>) -> Self {
        let verifier: Arc<dyn IdentityVerifier> = Arc::new(JwtVerifier::new(&settings.auth));
        let registry = Arc::new(ConnectionRegistry::new());
        let rooms = Arc::new(RoomIndex::new(registry.clone()));
        let chat = Arc::new(ChatRelay::new(rooms.clone(), store.clone()));
        let sessions = Arc::new(SessionRoomManager::new(
            rooms,
            registry.clone(),
            chat.clone(),
            store.clone(),
            settings.realtime.history_limit,
        ));

        let queue = Arc::new(NotificationQueue::new());
        let notifications = Arc::new(NotificationService::new(
            TemplateEngine::with_defaults(),
            queue.clone(),
            store,
            settings.notification.default_expiry_seconds,
        ));
        let dispatcher = Arc::new(
            DeliveryDispatcher::new()
                .register_sink(Arc::new(WebSocketSink::new(registry.clone())))
                .register_sink(Arc::new(LogEmailSink))
                .register_sink(Arc::new(LogSmsSink)),
        );
        let bus = Arc::new(
            EventBus::new().register(Arc::new(NotificationTrigger::new(notifications.clone()))),
        );

        Self {
            settings: Arc::new(settings),
            verifier,
            registry,
            sessions,
            chat,
            notifications,
            queue,
            dispatcher,
            bus,
        }
    }
}
