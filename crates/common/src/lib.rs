// inkstone-common: shared types and utilities for the Inkstone workspace

pub mod protocol;
pub mod text;
pub mod types;
