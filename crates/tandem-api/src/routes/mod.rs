pub mod auth;
pub mod chat;
pub mod pairing;
