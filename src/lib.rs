pub mod alert;
pub mod backend;
pub mod config;
pub mod connection;
pub mod details;
pub mod event;
pub mod notification;
pub mod session;
pub mod store;
pub mod version;
