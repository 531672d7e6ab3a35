pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod evaluation;
pub mod readings;
pub mod simulator;
pub mod state;
