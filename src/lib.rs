pub mod collab;
pub mod config;
pub mod errors;
pub mod generation;
pub mod http;
pub mod logging;
pub mod registry;
pub mod review;
pub mod runtime;
pub mod server;
pub mod ui;
pub mod util;
pub mod workflow;
