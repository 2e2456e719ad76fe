//! silo CLI: argument parsing, command execution, and console rendering.

pub mod cli;
pub mod render;
pub mod run;
