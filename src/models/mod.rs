pub mod core;
pub mod matching;
pub mod stats;

pub use self::core::*;
pub use self::matching::*;
pub use self::stats::*;
