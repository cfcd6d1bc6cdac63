// src/logs/mod.rs

pub mod hub;
pub mod ring;

pub use hub::{LogHub, LogSubscription};
pub use ring::LogRing;
