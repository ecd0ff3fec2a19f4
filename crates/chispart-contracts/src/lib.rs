//! Data types shared by the chispart engine and CLI: the prompt queue, styles,
//! provider and model catalogs, configuration, and local session artifacts.

pub mod chat;
pub mod config;
pub mod events;
pub mod media;
pub mod models;
pub mod providers;
pub mod queue;
pub mod session;
pub mod store;
pub mod styles;
