//! Command implementations for the zk-login proof system.

pub mod prove;
