//! Stand-ins for the downhole hardware

#[cfg(feature = "sim")]
pub mod sim;
