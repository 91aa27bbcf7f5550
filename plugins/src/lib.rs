pub mod diagnostics;
pub mod factory;
pub mod runner;
pub mod terminal;
