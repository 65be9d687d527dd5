// Infrastructure layer (shared components)
pub mod infrastructure;

// Re-export infrastructure modules
pub use infrastructure::auth;
pub use infrastructure::config;
pub use infrastructure::error;

// Domain layer (business logic)
pub mod chat;
pub mod connection;
pub mod events;
pub mod notification;
pub mod session;
pub mod store;
pub mod sweep;

// Application layer
pub mod api;
pub mod server;
pub mod websocket;

// Supporting modules
pub mod tasks;
