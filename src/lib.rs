pub mod config;
pub mod controller;
pub mod error;
pub mod guard;
pub mod model;
pub mod moves;
pub mod service;
pub mod session;
pub mod status;
pub mod store;
pub mod studio;
pub mod sync;
pub mod usage_key;
