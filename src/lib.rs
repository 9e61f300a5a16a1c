pub mod application;
pub mod core;
pub mod network;
pub mod security;
