//! Relay of new articles from a news site's realtime listing into a
//! Telegram channel, with a durable record of what was already sent.

pub mod config;
pub mod db;
pub mod dedup;
pub mod delivery;
pub mod model;
pub mod runner;
pub mod site;
pub mod telegram;
