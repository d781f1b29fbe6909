//! CLI command implementations.
//!
//! | Module   | Commands handled        |
//! |----------|-------------------------|
//! | `demo`   | `Demo` (and no command) |
//! | `config` | `Config`                |

pub mod config;
pub mod demo;

pub use config::cmd_config;
pub use demo::cmd_demo;
