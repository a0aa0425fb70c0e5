pub mod compress;
pub mod encrypt_utils;
pub mod health;
