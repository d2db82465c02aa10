pub mod history;
pub mod poll;
pub mod timecode;

pub use history::BoundedHistory;
pub use poll::{poll_until, PollConfig, PollError, PollStatus};
pub use timecode::{parse_timecode, Interval, TimecodeError};
