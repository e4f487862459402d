pub mod app;
pub mod domain;
pub mod error;
pub mod fetch;
pub mod manifest;
pub mod output;
pub mod store;
pub mod tui;
pub mod validate;
