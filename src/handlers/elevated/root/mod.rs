// handlers/elevated/root/mod.rs - Root administrative handlers

pub mod legacy_user; // Legacy user purge operations

pub use legacy_user::*;
