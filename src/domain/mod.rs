pub mod checkpoint;
pub mod hotel;
pub mod selector;

pub use checkpoint::*;
pub use hotel::*;
pub use selector::*;
