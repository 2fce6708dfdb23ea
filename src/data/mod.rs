pub mod counter;
pub mod window;

pub use counter::{name_hash, AppId, CounterId, CounterInput, CounterValue, SampleRow, ID_SPACE};
pub use window::DayWindow;
