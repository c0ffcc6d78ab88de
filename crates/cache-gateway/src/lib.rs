//! Library surface for the `cache-server` binary: the management HTTP
//! router, the substituter router, the deployment WebSocket router, and the
//! CLI command executor. Split out from `main.rs` (teacher convention, see
//! `rustmemodb`'s `lib.rs`/`main.rs` split) so integration tests can drive
//! the routers in-process with `tower::ServiceExt::oneshot` instead of
//! binding real sockets.

pub mod auth;
pub mod cli;
pub mod commands;
pub mod management;
pub mod state;
pub mod substituter;
pub mod tokens;
pub mod ws;
