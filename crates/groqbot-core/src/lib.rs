//! Core groqbot library (session store, streaming client, config).

pub mod config;
pub mod core;
pub mod models;
pub mod prompts;
pub mod providers;
