//! Top-level facade crate for lobbysync.
//!
//! Re-exports the core protocol, the server library and the client so users
//! can depend on a single crate.

pub mod core {
    pub use lobbysync_core::*;
}

pub mod server {
    pub use lobbysync_server::*;
}

pub mod client {
    pub use lobbysync_client::*;
}
