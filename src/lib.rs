//! Client-side session layer for the social network's chat: the real-time channel,
//! presence, the conversation list and the open conversation.

pub mod common;
pub mod config;
pub mod error;
pub mod network;
pub mod storage;
pub mod store;
pub mod ui;
