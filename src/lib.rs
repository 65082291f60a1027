//! Chat bot that mirrors the BTC price into a channel name, relays new posts
//! of a social account into a channel, and answers `/price` and `/roll`.

pub mod commands;
pub mod config;
pub mod discord;
pub mod error;
pub mod keepalive;
pub mod namer;
pub mod price;
pub mod relay;
pub mod render;
pub mod scheduler;
pub mod snowflake;
pub mod sources;
pub mod store;
