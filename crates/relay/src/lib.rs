pub mod agent;
pub mod classify;
pub mod engine;
pub mod errors;
pub mod models;
pub mod registry;
