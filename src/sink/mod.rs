pub mod channel;
pub mod codec;
pub mod logging;
pub mod udp;

pub use self::channel::ChannelSink;
pub use self::codec::ChunkCodec;
pub use self::logging::LogSink;
pub use self::udp::UdpSink;
