//! Kheyma session library (config, storage, identity, gateway, session store).

pub mod api;
pub mod config;
pub mod events;
pub mod gateway;
pub mod identity;
pub mod session;
pub mod storage;
