// externally visible interfaces
pub mod api;
pub mod command;
pub mod device;
pub mod fleet;
pub mod home_assistant;
pub mod mqtt_config;
pub mod mqtt_wrapper;
pub mod payload;
pub mod publisher;
pub mod reconciler;

// internal interfaces
mod home_assistant_config;
