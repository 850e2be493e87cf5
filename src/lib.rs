//! Curates the best-performing recent posts of a roster of accounts into a
//! review queue, and publishes quote images and a daily weather digest.

pub mod api;
pub mod config;
pub mod curation;
pub mod oauth;
pub mod publish;
pub mod ranking;
pub mod storage;

mod util;
