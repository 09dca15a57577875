use std::future;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use failure::*;
use log::*;
use structopt::StructOpt;
use tokio::{signal, task, time};

use chunkforward::hook::{DetrendHook, HighPassHook, HookChain};
use chunkforward::sink::{LogSink, UdpSink};
use chunkforward::source::{FileSource, SyntheticSource};
use chunkforward::{ChunkSink, Coordinator, OverrunPolicy, PipelineConfig, SampleSource};

enum SourceArg {
    Synthetic,
    File(PathBuf),
}

impl FromStr for SourceArg {
    type Err = String;

    fn from_str(s: &str) -> Result<SourceArg, String> {
        match s {
            "" => Err("empty source".to_string()),
            "synthetic" => Ok(SourceArg::Synthetic),
            path => Ok(SourceArg::File(path.into())),
        }
    }
}

enum SinkArg {
    Log,
    Udp(String),
}

impl FromStr for SinkArg {
    type Err = String;

    fn from_str(s: &str) -> Result<SinkArg, String> {
        if s == "log" {
            return Ok(SinkArg::Log);
        }
        match s.strip_prefix("udp://") {
            Some(addr) => Ok(SinkArg::Udp(addr.to_string())),
            None => Err(format!("unknown sink {:?} (expected log or udp://host:port)", s)),
        }
    }
}

fn parse_seconds(s: &str) -> Result<Duration, String> {
    let secs: f64 = s.parse().map_err(|e| format!("{:?}: {}", s, e))?;
    if !secs.is_finite() || secs <= 0.0 {
        return Err(format!("{:?} is not a positive number of seconds", s));
    }
    Ok(Duration::from_secs_f64(secs))
}

#[derive(StructOpt)]
#[structopt(
    name = "chunkforward",
    about = "buffers a live sample stream and forwards it in fixed-size chunks"
)]
struct Cli {
    /// `synthetic`, or the path of an interleaved little-endian f32 recording
    #[structopt(short, long, default_value = "synthetic")]
    source: SourceArg,

    /// `log`, or `udp://host:port`
    #[structopt(short = "o", long, default_value = "log")]
    sink: SinkArg,

    #[structopt(short, long, default_value = "3")]
    channels: usize,

    /// samples per channel kept in the buffer and sent in each chunk
    #[structopt(long, default_value = "150")]
    capacity: usize,

    /// samples between chunks
    #[structopt(short = "n", long, default_value = "38")]
    send_every: usize,

    /// sample rate in Hz
    #[structopt(short, long, default_value = "250")]
    rate: f64,

    /// high-pass cutoff in Hz applied to every chunk
    #[structopt(long)]
    highpass: Option<f32>,

    /// subtract each channel's mean from every chunk
    #[structopt(long)]
    detrend: bool,

    /// `coalesce` or `block` when a chunk is still pending at the next boundary
    #[structopt(long, default_value = "coalesce")]
    overrun: OverrunPolicy,

    /// consecutive source failures tolerated before giving up
    #[structopt(long, default_value = "5")]
    retries: u32,

    #[structopt(long, default_value = "250")]
    shutdown_timeout_ms: u64,

    /// stop after this many seconds
    #[structopt(long, parse(try_from_str = parse_seconds))]
    duration: Option<Duration>,

    /// channel labels, one per channel
    #[structopt(long)]
    label: Vec<String>,

    /// replay recordings as fast as possible
    #[structopt(long)]
    unpaced: bool,
}

impl Cli {
    fn config(&self) -> PipelineConfig {
        let mut config = PipelineConfig::new(self.channels, self.capacity, self.send_every);
        config.sample_rate = self.rate;
        config.overrun = self.overrun;
        config.retry.max_attempts = self.retries;
        config.shutdown_timeout = Duration::from_millis(self.shutdown_timeout_ms);
        config.channel_labels = self.label.clone();
        config
    }

    fn open_source(&self) -> Result<Box<dyn SampleSource>, Error> {
        let path = match &self.source {
            SourceArg::Synthetic => {
                return Ok(Box::new(SyntheticSource::new(self.channels, self.rate)));
            }
            SourceArg::File(path) => path,
        };

        let source = FileSource::open(path, self.channels, self.rate)?;
        if self.unpaced {
            Ok(Box::new(source.unpaced()))
        } else {
            Ok(Box::new(source))
        }
    }

    fn open_sink(&self) -> Result<Box<dyn ChunkSink>, Error> {
        let sink: Box<dyn ChunkSink> = match &self.sink {
            SinkArg::Log => Box::new(LogSink::new()),
            SinkArg::Udp(addr) => {
                let sink = UdpSink::connect(addr.as_str())?;
                info!("sending chunks to {}", sink.target());
                Box::new(sink)
            }
        };
        Ok(sink)
    }

    fn hooks(&self) -> Result<HookChain, Error> {
        let mut chain = HookChain::new();
        if self.detrend {
            chain = chain.with(DetrendHook);
        }
        if let Some(cutoff) = self.highpass {
            chain = chain.with(HighPassHook::new(self.rate as f32, cutoff)?);
        }
        Ok(chain)
    }
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    pretty_env_logger::init();
    let args = Cli::from_args();

    let mut coordinator = Coordinator::new(args.config(), args.open_source()?, args.open_sink()?)?;
    let hooks = args.hooks()?;
    if !hooks.is_empty() {
        coordinator = coordinator.with_hook(hooks);
    }

    let config = coordinator.config();
    info!(
        "{} channels, {} samples per chunk, one chunk every {} samples",
        config.channels, config.capacity, config.send_every
    );

    let handle = coordinator.shutdown_handle();
    let mut run = task::spawn_blocking(move || coordinator.run());

    let deadline = args.duration;
    let timer = async move {
        match deadline {
            Some(limit) => time::sleep(limit).await,
            None => future::pending::<()>().await,
        }
    };

    let result = tokio::select! {
        finished = &mut run => finished?,
        _ = signal::ctrl_c() => {
            info!("interrupted, shutting down");
            handle.request();
            run.await?
        }
        _ = timer => {
            info!("run time elapsed, shutting down");
            handle.request();
            run.await?
        }
    };

    match result {
        Ok(report) => {
            if handle.is_requested() {
                info!("stopped: {}", report);
            } else {
                info!("source finished: {}", report);
            }
            Ok(())
        }
        Err(e) => {
            error!("pipeline failed: {}", e);
            Err(e.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_must_be_positive_seconds() {
        assert_eq!(parse_seconds("1.5"), Ok(Duration::from_millis(1500)));
        assert!(parse_seconds("-2").is_err());
        assert!(parse_seconds("NaN").is_err());
        assert!(parse_seconds("inf").is_err());
        assert!(parse_seconds("0").is_err());
        assert!(parse_seconds("soon").is_err());
    }

    #[test]
    fn cli_rejects_negative_duration() {
        assert!(Cli::from_iter_safe(&["chunkforward", "--duration", "-1"]).is_err());
        let args = Cli::from_iter_safe(&["chunkforward", "--duration", "0.25"]).unwrap();
        assert_eq!(args.duration, Some(Duration::from_millis(250)));
    }
}
