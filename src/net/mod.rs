//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Outbound request about to open a connection
//!     → dialer.rs (fresh lookup, policy check on every answer)
//!     → single approved address handed to the HTTP client
//!     → TCP/TLS connect (bounded by the connect timeout)
//! ```
//!
//! # Design Decisions
//! - No address is dialed unless it passed the policy at dial time
//! - Nothing resolved here outlives the connection attempt

pub mod dialer;
pub mod tls;

pub use dialer::{DialError, SafeDialer};
