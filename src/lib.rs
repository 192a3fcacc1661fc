pub mod app;
pub mod bridge;
pub mod catalog;
pub mod chat;
pub mod error;
pub mod gemini;
pub mod handlers;
pub mod upstream;
