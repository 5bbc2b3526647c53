/// Whitelist/blacklist access control
pub mod access;
/// Command and message handlers
pub mod handlers;
/// Transport-free view of incoming messages
pub mod inbound;
/// Photo and voice media helpers
pub mod media;
/// Message sending utilities
pub mod messaging;
/// Trigger tables for routing
pub mod triggers;
