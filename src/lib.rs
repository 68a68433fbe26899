// Sommelier - Tiered wine identification service
// Library exports

// Core modules
pub mod cache;
pub mod config;
pub mod identify;
pub mod intent;
pub mod providers;
pub mod server;
pub mod usage;
