pub mod commands;
pub mod corpus;
pub mod output;
pub mod trace_init;
