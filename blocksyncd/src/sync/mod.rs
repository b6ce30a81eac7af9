pub mod engine;
pub mod notifier;
pub mod profile;
pub mod state;
