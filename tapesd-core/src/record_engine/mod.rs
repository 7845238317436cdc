//! Drives the block codec (`tapesd-block`) against a `Device`
//! (`tapesd-io`): splits records across blocks, reassembles them
//! across block boundaries, and emits session-boundary markers
//! (§4.2, §4.3).

mod append;
mod read;

pub use append::*;
pub use read::*;
