//! CLI command implementations.
//!
//! | Module   | Commands handled              |
//! |----------|-------------------------------|
//! | `serve`  | `Serve`                       |
//! | `run`    | `Run`                         |
//! | `config` | `Config show/validate/init`   |

pub mod config;
pub mod run;
pub mod serve;

pub use config::cmd_config;
pub use run::cmd_run;
pub use serve::cmd_serve;
