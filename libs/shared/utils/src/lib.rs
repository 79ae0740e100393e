pub mod cache;
pub mod clock;
pub mod extractor;
pub mod jwt;
pub mod test_utils;

pub use cache::{CacheStats, TtlCache};
pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
