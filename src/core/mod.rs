pub mod actions;
pub mod bus;
pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod execution;
pub mod lifecycle;
pub mod listeners;
pub mod owners;
pub mod store;
pub mod template;
pub mod terminal;
pub mod types;
