use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};

use bytes::BytesMut;
use log::*;
use tokio_util::codec::Encoder;

use super::codec::{self, ChunkCodec};
use crate::chunk::Chunk;
use crate::config::StreamDescriptor;
use crate::error::SinkError;
use crate::ChunkSink;

/// Sends every chunk as one framed datagram to a fixed peer.
pub struct UdpSink {
    socket: UdpSocket,
    target: SocketAddr,
    codec: ChunkCodec,
    buf: BytesMut,
    shape: Option<(usize, usize)>,
}

impl UdpSink {
    pub fn connect<A: ToSocketAddrs>(target: A) -> Result<UdpSink, SinkError> {
        let target = target
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| SinkError::Rejected("target address did not resolve".to_string()))?;
        let bind: SocketAddr = if target.is_ipv4() {
            ([0, 0, 0, 0], 0).into()
        } else {
            ([0u16; 8], 0).into()
        };
        let socket = UdpSocket::bind(bind)?;
        debug!("udp sink {} -> {}", socket.local_addr()?, target);

        Ok(UdpSink {
            socket,
            target,
            codec: ChunkCodec::new(),
            buf: BytesMut::new(),
            shape: None,
        })
    }

    pub fn target(&self) -> SocketAddr {
        self.target
    }
}

impl ChunkSink for UdpSink {
    fn open(&mut self, desc: &StreamDescriptor) -> Result<(), SinkError> {
        let len = codec::frame_len(desc.channel_count(), desc.chunk_size);
        if len > codec::MAX_DATAGRAM {
            return Err(SinkError::Rejected(format!(
                "{} chunk of ({}, {}) needs {} bytes, over the {} byte datagram limit",
                desc.name,
                desc.channel_count(),
                desc.chunk_size,
                len,
                codec::MAX_DATAGRAM
            )));
        }

        self.shape = Some((desc.channel_count(), desc.chunk_size));
        self.buf.reserve(len);
        info!(
            "forwarding {} ({}) to udp://{}, {} bytes per chunk",
            desc.name, desc.kind, self.target, len
        );
        Ok(())
    }

    fn push_chunk(&mut self, chunk: &Chunk) -> Result<(), SinkError> {
        if let Some(shape) = self.shape {
            if shape != (chunk.channels(), chunk.len()) {
                return Err(SinkError::Rejected(format!(
                    "chunk shape ({}, {}) differs from negotiated {:?}",
                    chunk.channels(),
                    chunk.len(),
                    shape
                )));
            }
        }

        self.buf.clear();
        self.codec.encode(chunk, &mut self.buf)?;
        let sent = self.socket.send_to(&self.buf, self.target)?;
        trace!(
            "sent {} bytes: {}..",
            sent,
            hex::encode(&self.buf[..self.buf.len().min(codec::HEADER_LEN)])
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use std::time::Duration;
    use tokio_util::codec::Decoder;

    #[test]
    fn sends_decodable_datagrams() {
        let listener = UdpSocket::bind("127.0.0.1:0").unwrap();
        listener
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();

        let mut sink = UdpSink::connect(listener.local_addr().unwrap()).unwrap();
        sink.open(&PipelineConfig::new(2, 3, 1).descriptor()).unwrap();

        let chunk = Chunk::new(3, 0.5, vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]]);
        sink.push_chunk(&chunk).unwrap();

        let mut buf = vec![0u8; codec::MAX_DATAGRAM];
        let (n, _) = listener.recv_from(&mut buf).unwrap();
        let mut frame = BytesMut::from(&buf[..n]);
        assert_eq!(ChunkCodec::new().decode(&mut frame).unwrap(), Some(chunk));
    }

    #[test]
    fn refuses_oversized_streams_and_wrong_shapes() {
        let mut sink = UdpSink::connect("127.0.0.1:9").unwrap();
        assert!(sink
            .open(&PipelineConfig::new(64, 1024, 1).descriptor())
            .is_err());

        sink.open(&PipelineConfig::new(2, 3, 1).descriptor()).unwrap();
        let wrong = Chunk::new(0, 0.0, vec![vec![1.0]]);
        match sink.push_chunk(&wrong) {
            Err(SinkError::Rejected(_)) => {}
            other => panic!("expected rejection, got {:?}", other),
        }
    }
}
