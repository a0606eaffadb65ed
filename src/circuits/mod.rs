//! Circuit implementations for the zk-login proof system.

pub mod zk_login;
