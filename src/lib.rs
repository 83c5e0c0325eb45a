pub mod api;
pub mod commands;
pub mod config;
pub mod error;
pub mod logging;
pub mod proxy;
pub mod transport;

#[cfg(test)]
pub mod test_utils;
