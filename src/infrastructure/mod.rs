pub mod processor;
pub mod workspace;
