//! Process-level concerns for the command-line front end.

pub mod interrupt;
