pub mod stdio;

pub use stdio::StdioTerminals;
