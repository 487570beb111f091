pub mod checkpoint_store;
pub mod file_io;
pub mod record_sink;

pub use checkpoint_store::*;
pub use record_sink::*;
