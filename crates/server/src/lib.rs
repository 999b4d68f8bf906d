pub mod api;
pub mod audit;
pub mod bootstrap;
pub mod health;
pub mod services;
