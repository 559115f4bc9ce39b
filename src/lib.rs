//! RouteSockets demo - Main Library
//!
//! Glue shared by the demo binaries.
//!
//! ## Architecture
//!
//! - **bin_common**: Common utilities for binary executables (CLI, logging)
//! - **routesockets**: WebSocket server and client (re-exported from workspace)
//!
//! ## Usage in Binaries
//!
//! ```rust
//! use routesockets_demo::bin_common::{load_config_from_env, ConfigType};
//! use routesockets_demo::routesockets::WebSocketServer;
//! ```

// Re-export workspace libraries for convenience
pub use routesockets;

// Binary common utilities
pub mod bin_common {
    //! Common utilities for binary executables

    pub mod cli;
    pub mod logging;

    pub use cli::{load_config_from_env, parse_args, ConfigType};
    pub use logging::init_tracing;
}
