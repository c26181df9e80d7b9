pub mod compare;
mod chunk;
mod mapped;
mod pool;

pub use self::chunk::*;
pub use self::compare::{assert_chunks_close, assert_chunks_equal, Mismatch, Tolerance};
pub use self::mapped::{MappedArgs, MappedBuffer};
pub use self::pool::*;
