pub mod api;
pub mod clients;
pub mod config;
pub mod delivery;
pub mod error;
pub mod listener;
pub mod models;
pub mod publisher;
pub mod qrcode;
pub mod service;
pub mod template;
