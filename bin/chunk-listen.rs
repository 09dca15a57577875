use std::error::Error;

use log::*;
use structopt::StructOpt;
use tokio::net::UdpSocket;
use tokio_stream::StreamExt;
use tokio_util::udp::UdpFramed;

use chunkforward::sink::ChunkCodec;
use chunkforward::Chunk;

#[derive(StructOpt)]
#[structopt(name = "chunk-listen", about = "receives forwarded chunks over udp")]
struct Cli {
    #[structopt(short, long, default_value = "0.0.0.0:47100")]
    bind: String,

    /// samples to accumulate before reporting a batch
    #[structopt(short = "n", long, default_value = "150")]
    batch: usize,
}

fn concat(batch: &[Chunk]) -> Vec<Vec<f32>> {
    batch.iter().flat_map(|chunk| chunk.to_samples()).collect()
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    pretty_env_logger::init();
    let args = Cli::from_args();

    let socket = UdpSocket::bind(&args.bind).await?;
    info!("listening on {}", socket.local_addr()?);

    let mut frames = UdpFramed::new(socket, ChunkCodec::new());
    let mut batch: Vec<Chunk> = Vec::new();
    let mut batched = 0;
    let mut last_seq: Option<u64> = None;

    while let Some(frame) = frames.next().await {
        let (chunk, from) = match frame {
            Ok(frame) => frame,
            Err(e) => {
                warn!("discarding datagram: {}", e);
                continue;
            }
        };

        if let Some(prev) = last_seq {
            if chunk.seq > prev + 1 {
                warn!("{} chunks missing before #{}", chunk.seq - prev - 1, chunk.seq);
            }
        }
        last_seq = Some(chunk.seq);

        info!("{} from {}", chunk, from);
        batched += chunk.len();
        batch.push(chunk);

        if batched >= args.batch {
            let data = concat(&batch);
            info!(
                "batch of {} chunks: ({}, {})",
                batch.len(),
                data.len(),
                data.first().map(Vec::len).unwrap_or(0)
            );
            batch.clear();
            batched = 0;
        }
    }

    trace!("stream ended");

    Ok(())
}
