mod settings;

pub use settings::{
    AuthConfig, NotificationConfig, RealtimeConfig, ServerConfig, Settings, SweepConfig,
};
