mod ring_bytes;
mod sync;

pub use ring_bytes::RingBytes;
pub use sync::lock;
