//! casparclock keeps a news clock lower third on a CasparCG server in sync.
//!
//! The binary wires these pieces together: a [`session::Session`] talking AMCP
//! over [`transport::Transport`], a minute-aligned [`scheduler`], and the HTTP
//! surface in [`api`].

pub mod api;
pub mod clock;
pub mod config;
pub mod scheduler;
pub mod session;
pub mod shutdown;
pub mod transport;
