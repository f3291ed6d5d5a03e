//! gptproxy core library
//! Request classification, arkose token provisioning and response relay for
//! the ChatGPT backend API

pub mod config;
pub mod proxy;
