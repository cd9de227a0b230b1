//! Host-facing JSON contract for driving parley from a native shell.

pub mod collaborators;
pub mod contract;
pub mod handler;
pub mod stdio;
