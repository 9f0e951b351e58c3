pub mod commands;
pub mod config;
pub mod daemon;
pub mod db;
pub mod error;
pub mod escalation;
pub mod ledger;
pub mod models;
pub mod series;
pub mod transition;
