pub mod local;

pub use local::LocalProcessPlugin;
