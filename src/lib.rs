pub mod config;
pub mod controller;
pub mod gateway;
pub mod prompts;
pub mod server;
pub mod session;
