pub mod admission;
pub mod callback;
pub mod compression;
pub mod credentials;
pub mod encryption;
pub mod job;
pub mod process;
pub mod worker;
