pub mod configuration;
pub mod connectors;
pub mod health;
pub mod helpers;
pub mod labels;
pub mod models;
pub mod services;
pub mod startup;
pub mod telemetry;
