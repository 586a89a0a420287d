pub mod commands;
pub mod config;
pub mod doctor;
pub mod error;
pub mod hooks;
pub mod logging;
pub mod mux;
pub mod paths;
pub mod resolve;
pub mod session;
pub mod state;
pub mod status;
pub mod ui;

#[cfg(test)]
pub mod test_utils;
