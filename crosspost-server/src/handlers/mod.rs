pub mod health;
pub mod jobs;
pub mod libraries;
pub mod posts;
pub mod ws;
