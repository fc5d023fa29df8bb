// Bearer-token sessions
pub mod auth;

// Service configuration
pub mod config;

// Encrypted installation storage
pub mod credentials;

// Provider install strategies
pub mod installers;

// Outbound provider API clients
pub mod providers;

// HTTP API
pub mod api;
