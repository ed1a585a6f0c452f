pub mod api;
pub mod app;
pub mod bundle;
pub mod cache;
pub mod commands;
pub mod config;
pub mod event;
pub mod form;
pub mod gate;
pub mod logging;
pub mod query;
pub mod session;
pub mod store;
pub mod ui;
