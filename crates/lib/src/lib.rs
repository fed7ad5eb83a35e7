//! Chatbot core library: chat session, message exchange with the remote endpoint,
//! voice capture and playback, and attachment intake. Used by the terminal client.

pub mod attachments;
pub mod auth;
pub mod config;
pub mod controller;
pub mod endpoint;
pub mod init;
pub mod notice;
pub mod prefs;
pub mod session;
pub mod voice;
