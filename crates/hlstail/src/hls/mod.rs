pub mod key;
mod live;
pub mod playlist;
pub mod resolve;
pub mod segment;

pub use live::ChunkListPoller;
pub use m3u8_rs;
