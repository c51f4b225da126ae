pub mod browse;
pub mod callback;
pub mod command;
