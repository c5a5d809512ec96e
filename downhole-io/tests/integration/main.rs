//! Integration tests for downhole-io
//!
//! Every loop runs on its own thread against [`MockTransport`] or the
//! simulated unit, with an in-process store.
//!
//! ```bash
//! cargo test --test integration -- --nocapture
//! ```
//!
//! [`MockTransport`]: downhole_io::transport::MockTransport

mod harness;
mod link;
#[cfg(feature = "sim")]
mod sim;
mod store_server;
