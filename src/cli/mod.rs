//! Command implementations for the `memos-migrate` binary

pub mod init;
pub mod resolve;
pub mod run;
pub mod status;
pub mod tags;
