pub mod channel;
pub mod feed;
pub mod file;
pub mod synthetic;

pub use channel::ChannelSource;
pub use feed::{sample_feed, RingSource, SampleFeeder};
pub use file::FileSource;
pub use synthetic::SyntheticSource;
