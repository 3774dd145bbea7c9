pub mod destructibility;
pub mod feed;
pub mod wind;

pub use destructibility::BlockDestructibility;
pub use feed::{
    DisabledFeed, FeedError, FeedMonitor, SharedFeed, StormId, StormSnapshot, StormType,
    WeatherFeed,
};
pub use wind::WindField;
