//! Real-time coordination server for group restaurant matching.
//!
//! Inbound participant actions enter through the WebSocket boundary
//! (`ws_server`), are routed by the `coordinator` to per-session state held
//! in the `registry`, and the resulting events fan out over the `gateway`
//! bus to every subscriber of that session.

pub mod candidates;
pub mod coordinator;
pub mod gateway;
pub mod registry;
pub mod ws_server;
