use std::thread;
use std::time::Duration;

use crossbeam_channel::Receiver;

use chunkforward::pipeline::{ChunkEmitter, Ingested, PipelineState, SampleIngestor};
use chunkforward::sink::ChannelSink;
use chunkforward::source::{sample_feed, ChannelSource};
use chunkforward::{
    Chunk, ChunkSink, Coordinator, OverrunPolicy, PipelineConfig, RunReport, Sample, SinkError,
    StreamDescriptor,
};

const WAIT: Duration = Duration::from_secs(2);

fn config(channels: usize, capacity: usize, send_every: usize) -> PipelineConfig {
    let mut config = PipelineConfig::new(channels, capacity, send_every);
    config.shutdown_timeout = Duration::from_millis(10);
    config.overrun = OverrunPolicy::Block;
    config
}

/// Refuses the first `failures` chunks, then forwards like a channel outlet.
struct FlakySink {
    inner: ChannelSink,
    failures: usize,
}

impl ChunkSink for FlakySink {
    fn open(&mut self, desc: &StreamDescriptor) -> Result<(), SinkError> {
        self.inner.open(desc)
    }

    fn push_chunk(&mut self, chunk: &Chunk) -> Result<(), SinkError> {
        if self.failures > 0 {
            self.failures -= 1;
            return Err(SinkError::Backpressure);
        }
        self.inner.push_chunk(chunk)
    }
}

fn collect(rx: &Receiver<Chunk>, n: usize) -> Vec<Chunk> {
    (0..n).map(|_| rx.recv_timeout(WAIT).unwrap()).collect()
}

#[test]
fn cadence_four_capacity_six_scenario() {
    let config = config(2, 6, 4);
    let state = PipelineState::new(&config).unwrap();
    let (_tx, rx) = crossbeam_channel::unbounded();
    let mut source = ChannelSource::new(rx, 2);
    let (mut sink, chunks) = ChannelSink::bounded(4);

    let mut ingestor = SampleIngestor::new(&config, &mut source, &state);
    let pairs = [(1.0, 10.0), (2.0, 20.0), (3.0, 30.0), (4.0, 40.0)];
    let outcomes: Vec<Ingested> = pairs
        .iter()
        .map(|(a, b)| ingestor.accept(&Sample::new(vec![*a, *b], 0.0)).unwrap())
        .collect();
    assert_eq!(
        outcomes,
        vec![
            Ingested::Accepted,
            Ingested::Accepted,
            Ingested::Accepted,
            Ingested::Raised
        ]
    );
    assert!(state.signal.is_pending());
    assert_eq!(ingestor.counter(), 0);

    let mut emitter = ChunkEmitter::new(&config, &mut sink, &state, None);
    emitter.emit().unwrap();
    assert!(!state.signal.is_pending());

    let chunk = chunks.try_recv().unwrap();
    assert_eq!(chunk.channel(0).unwrap(), &[0.0, 0.0, 1.0, 2.0, 3.0, 4.0]);
    assert_eq!(chunk.channel(1).unwrap(), &[0.0, 0.0, 10.0, 20.0, 30.0, 40.0]);

    let stats = state.signal.stats();
    assert_eq!((stats.raised, stats.cleared), (1, 1));
}

#[test]
fn one_chunk_per_raise() {
    let (mut feeder, source) = sample_feed(1, 64);
    let (sink, rx) = ChannelSink::bounded(64);
    let coordinator = Coordinator::new(config(1, 8, 4), source, sink).unwrap();
    let handle = coordinator.shutdown_handle();

    for i in 1..=40 {
        assert!(feeder.push(&[i as f32], i as f64).unwrap());
    }

    let runner = thread::spawn(move || coordinator.run());
    let chunks = collect(&rx, 10);
    handle.request();
    let report: RunReport = runner.join().unwrap().unwrap();

    let seqs: Vec<u64> = chunks.iter().map(|c| c.seq).collect();
    assert_eq!(seqs, (0..10).collect::<Vec<_>>());
    for (k, chunk) in chunks.iter().enumerate() {
        let newest = *chunk.channel(0).unwrap().last().unwrap();
        assert!(newest >= (4 * (k + 1)) as f32, "chunk {} ends at {}", k, newest);
    }
    assert_eq!(*chunks[9].channel(0).unwrap().last().unwrap(), 40.0);

    assert_eq!(report.ingest.accepted, 40);
    assert_eq!(report.signal.raised, 10);
    assert_eq!(report.signal.cleared, 10);
    assert_eq!(report.signal.coalesced, 0);
    assert_eq!(report.emit.sent, 10);
    assert!(rx.try_recv().is_err());
}

#[test]
fn rejected_push_is_dropped_and_pipeline_continues() {
    let (mut feeder, source) = sample_feed(1, 16);
    let (inner, rx) = ChannelSink::bounded(8);
    let sink = FlakySink { inner, failures: 1 };
    let coordinator = Coordinator::new(config(1, 4, 4), source, sink).unwrap();
    let handle = coordinator.shutdown_handle();

    for i in 1..=8 {
        feeder.push(&[i as f32], 0.0).unwrap();
    }

    let runner = thread::spawn(move || coordinator.run());
    let delivered = rx.recv_timeout(WAIT).unwrap();
    handle.request();
    let report = runner.join().unwrap().unwrap();

    assert_eq!(delivered.seq, 1);
    assert_eq!(delivered.channel(0).unwrap(), &[5.0, 6.0, 7.0, 8.0]);
    assert_eq!(report.emit.dropped, 1);
    assert_eq!(report.emit.sent, 1);
    assert_eq!(report.signal.raised, 2);
    assert_eq!(report.ingest.accepted, 8);
}

#[test]
fn idle_source_neither_signals_nor_disturbs_the_buffer() {
    let (mut feeder, source) = sample_feed(1, 16);
    let (sink, rx) = ChannelSink::bounded(8);
    let coordinator = Coordinator::new(config(1, 4, 4), source, sink).unwrap();
    let handle = coordinator.shutdown_handle();
    let runner = thread::spawn(move || coordinator.run());

    feeder.push(&[1.0], 0.0).unwrap();
    feeder.push(&[2.0], 0.1).unwrap();
    assert!(rx.recv_timeout(Duration::from_millis(150)).is_err());

    feeder.push(&[3.0], 5.0).unwrap();
    feeder.push(&[4.0], 5.1).unwrap();
    let chunk = rx.recv_timeout(WAIT).unwrap();
    assert_eq!(chunk.channel(0).unwrap(), &[1.0, 2.0, 3.0, 4.0]);

    handle.request();
    let report = runner.join().unwrap().unwrap();
    assert_eq!(report.signal.raised, 1);
    assert!(report.ingest.idle_polls > 0);
    assert_eq!(report.ingest.source_errors, 0);
}

#[test]
fn shutdown_does_not_hang_on_a_silent_source() {
    let (_feeder, source) = sample_feed(2, 4);
    let (sink, _rx) = ChannelSink::bounded(1);
    let coordinator = Coordinator::new(config(2, 4, 2), source, sink).unwrap();
    let handle = coordinator.shutdown_handle();

    let runner = thread::spawn(move || coordinator.run());
    thread::sleep(Duration::from_millis(30));
    handle.request();

    let report = runner.join().unwrap().unwrap();
    assert_eq!(report.ingest.accepted, 0);
    assert_eq!(report.emit.sent, 0);
}

#[test]
fn hook_output_reaches_the_sink() {
    let (mut feeder, source) = sample_feed(1, 8);
    let (sink, rx) = ChannelSink::bounded(8);
    let coordinator = Coordinator::new(config(1, 2, 2), source, sink)
        .unwrap()
        .with_hook(|data: &mut [Vec<f32>]| {
            for v in data[0].iter_mut() {
                *v = -*v;
            }
        });
    let handle = coordinator.shutdown_handle();

    feeder.push(&[1.0], 0.0).unwrap();
    feeder.push(&[2.0], 0.0).unwrap();
    let runner = thread::spawn(move || coordinator.run());

    let chunk = rx.recv_timeout(WAIT).unwrap();
    handle.request();
    runner.join().unwrap().unwrap();
    assert_eq!(chunk.channel(0).unwrap(), &[-1.0, -2.0]);
}
