mod io_pump;
mod process;
mod scan;
mod traits;
mod types;

pub use io_pump::{pump_chunks, OutputChunk, OutputStream};
pub use process::{ProcessRunner, RunnerCloseHandle};
pub use scan::WarningScanner;
pub use traits::{ProcessPlugin, ProcessSession};
pub use types::SpawnArgs;
