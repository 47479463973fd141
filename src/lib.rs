pub mod chat;
pub mod config;
pub mod constants;
pub mod decompose;
pub mod gemini;
pub mod plan;
pub mod web_server;
