//! HTTP surface consumed by the operator tools

pub mod error;
pub mod server;

pub use server::serve;
