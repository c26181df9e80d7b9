use async_stream::try_stream;
use futures::{pin_mut, Stream, StreamExt, TryStreamExt};
use log::{info, warn};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use uuid::Uuid;

use crate::buffer::{BufferChunk, BufferPool};
use crate::config::PipelineConfig;
use crate::connector::{BinaryFileSink, BinaryFileSource, EndpointState, StreamBlock};
use crate::error::{BlockError, JobError};
use crate::stream::{InputQueue, WorkInfo, WorkStatus};
use crate::types::DType;

/// Chunks in flight between the source task and the sink task of a job.
const CHANNEL_CAPACITY: usize = 16;

/// Runs work turns on an activated source and yields each produced chunk.
///
/// Output buffers come from `pool`; every chunk handed downstream is a copy
/// of the produced prefix, so pool chunks never outlive their turn. The
/// stream ends when the source reports end of stream. A source with auto
/// rewind never ends on its own.
pub fn drive_source<'a>(
    source: &'a mut BinaryFileSource,
    pool: &'a mut BufferPool,
    info: WorkInfo,
) -> impl Stream<Item = Result<BufferChunk, BlockError>> + Send + 'a {
    try_stream! {
        loop {
            let handle = pool.acquire()?;
            let (status, produced) = {
                let mut output = pool.output(&handle);
                let status = source.work(&info, &mut output).await;
                (status, output.produced())
            };
            let chunk = match produced {
                0 => None,
                n => Some(pool.chunk(&handle).prefix(n)?),
            };
            pool.release(handle);

            match status {
                WorkStatus::EndOfStream => break,
                WorkStatus::Yield => tokio::task::yield_now().await,
                WorkStatus::Progress(_) | WorkStatus::Rewound => {}
            }
            if let Some(chunk) = chunk {
                yield chunk;
            }
        }
    }
}

/// Feeds `chunks` into an activated sink, running turns until each chunk is
/// written. Returns the number of elements consumed.
///
/// Input that a sink without a handle can never write is dropped with a
/// warning instead of stalling the stream.
pub async fn drive_sink<S>(
    sink: &mut BinaryFileSink,
    info: WorkInfo,
    dtype: DType,
    chunks: S,
) -> Result<usize, BlockError>
where
    S: Stream<Item = Result<BufferChunk, BlockError>>,
{
    let mut queue = InputQueue::new(dtype);
    let mut consumed = 0;
    pin_mut!(chunks);
    while let Some(chunk) = chunks.next().await {
        queue.push(&chunk?)?;
        while !queue.is_empty() {
            match sink.work(&info, &mut queue).await {
                WorkStatus::Progress(n) => consumed += n,
                _ if sink.is_enabled() && sink.state() != EndpointState::Active => {
                    warn!(
                        "sink {} has no open file, dropping {} elements",
                        sink.file_path(),
                        queue.elements()
                    );
                    queue.consume(queue.elements());
                }
                _ => tokio::task::yield_now().await,
            }
        }
    }
    Ok(consumed)
}

/// Activates `source`, reads until end of stream and deactivates it.
pub async fn read_all(
    source: &mut BinaryFileSource,
    info: WorkInfo,
    chunk_elements: usize,
) -> Result<Vec<BufferChunk>, BlockError> {
    source.activate().await?;
    let mut pool = BufferPool::new(source.dtype(), chunk_elements);
    let chunks = drive_source(&mut *source, &mut pool, info)
        .try_collect::<Vec<_>>()
        .await;
    source.deactivate().await;
    chunks
}

/// Activates `sink`, writes every chunk and deactivates it, flushing the
/// file. Returns the number of elements consumed.
pub async fn write_all<'a>(
    sink: &mut BinaryFileSink,
    info: WorkInfo,
    dtype: DType,
    chunks: impl IntoIterator<Item = &'a BufferChunk>,
) -> Result<usize, BlockError> {
    sink.activate().await?;
    let stream = futures::stream::iter(chunks.into_iter().cloned().map(Ok::<_, BlockError>));
    let consumed = drive_sink(&mut *sink, info, dtype, stream).await;
    sink.deactivate().await;
    consumed
}

/// A source wired to a sink, ready to be spawned on the tokio runtime.
pub struct Job {
    pub job_id: String,
    source: BinaryFileSource,
    sink: BinaryFileSink,
    info: WorkInfo,
    chunk_elements: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobSummary {
    pub produced: usize,
    pub consumed: usize,
}

/// Stops a running job from another task.
pub struct StopHandle(oneshot::Sender<()>);

impl StopHandle {
    pub fn stop(self) {
        let _ = self.0.send(());
    }
}

pub struct StreamRunningJob {
    pub job_id: String,
    stop_tx: Option<oneshot::Sender<()>>,
    source_handle: JoinHandle<Result<usize, BlockError>>,
    sink_handle: JoinHandle<Result<usize, BlockError>>,
}

impl Job {
    pub fn new(
        source: BinaryFileSource,
        sink: BinaryFileSink,
        info: WorkInfo,
        chunk_elements: usize,
    ) -> Self {
        Job {
            job_id: Uuid::new_v4().to_string(),
            source,
            sink,
            info,
            chunk_elements,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(
            BinaryFileSource::from_config(&config.source),
            BinaryFileSink::from_config(&config.sink),
            config.work_info(),
            config.chunk_elements,
        )
    }

    /// Spawns one task per block. The source task ends at end of stream or
    /// when stopped; the sink task ends once it has written everything the
    /// source produced. Both blocks are deactivated on the way out.
    pub fn spawn(self) -> StreamRunningJob {
        let Job {
            job_id,
            mut source,
            mut sink,
            info,
            chunk_elements,
        } = self;
        let dtype = source.dtype();
        let (tx, rx) = mpsc::channel::<BufferChunk>(CHANNEL_CAPACITY);
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();

        let source_job_id = job_id.clone();
        let source_handle = tokio::spawn(async move {
            source.activate().await?;
            let mut pool = BufferPool::new(dtype, chunk_elements);
            let mut produced = 0;
            let result = {
                let chunks = drive_source(&mut source, &mut pool, info);
                pin_mut!(chunks);
                let mut stop_open = true;
                loop {
                    tokio::select! {
                        signal = &mut stop_rx, if stop_open => match signal {
                            Ok(()) => {
                                info!("job {} stopped", source_job_id);
                                break Ok(());
                            }
                            // no one can stop the job any more
                            Err(_) => stop_open = false,
                        },
                        next = chunks.next() => match next {
                            Some(Ok(chunk)) => {
                                produced += chunk.elements();
                                if tx.send(chunk).await.is_err() {
                                    break Ok(());
                                }
                            }
                            Some(Err(err)) => break Err(err),
                            None => break Ok(()),
                        },
                    }
                }
            };
            source.deactivate().await;
            result.map(|_| produced)
        });

        let sink_handle = tokio::spawn(async move {
            sink.activate().await?;
            let chunks = ReceiverStream::new(rx).map(Ok::<_, BlockError>);
            let consumed = drive_sink(&mut sink, info, dtype, chunks).await;
            sink.deactivate().await;
            consumed
        });

        StreamRunningJob {
            job_id,
            stop_tx: Some(stop_tx),
            source_handle,
            sink_handle,
        }
    }
}

impl StreamRunningJob {
    /// Takes the handle that stops this job. Once taken, only the handle
    /// can stop the job.
    pub fn stop_handle(&mut self) -> Option<StopHandle> {
        self.stop_tx.take().map(StopHandle)
    }

    /// Stops reading, lets the sink write what was already produced and
    /// waits for both blocks to shut down.
    pub async fn stop(mut self) -> Result<JobSummary, JobError> {
        if let Some(stop) = self.stop_handle() {
            stop.stop();
        }
        self.wait().await
    }

    /// Waits for the job to finish on its own.
    pub async fn wait(self) -> Result<JobSummary, JobError> {
        let StreamRunningJob {
            stop_tx,
            source_handle,
            sink_handle,
            ..
        } = self;
        let produced = source_handle.await?;
        drop(stop_tx);
        let consumed = sink_handle.await??;
        Ok(JobSummary {
            produced: produced?,
            consumed,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::buffer::assert_chunks_equal;
    use crate::config::{SinkConfig, SourceConfig};

    fn info() -> WorkInfo {
        WorkInfo::new(Duration::from_secs(1))
    }

    #[tokio::test]
    async fn test_write_all_then_read_all() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.bin");
        let path = path.to_str().unwrap();
        let chunks = [
            BufferChunk::from_slice(&[1.5f64, -2.25]).unwrap(),
            BufferChunk::from_slice(&[] as &[f64]).unwrap(),
            BufferChunk::from_slice(&[3.0f64]).unwrap(),
        ];

        let mut sink = BinaryFileSink::new();
        sink.set_file_path(path).await.unwrap();
        let consumed = write_all(&mut sink, info(), DType::FLOAT64, &chunks)
            .await
            .unwrap();
        assert_eq!(consumed, 3);
        assert_eq!(sink.state(), EndpointState::Configured);

        let mut source = BinaryFileSource::new(DType::FLOAT64);
        source.set_file_path(path).await.unwrap();
        let read = read_all(&mut source, info(), 2).await.unwrap();
        assert_eq!(source.state(), EndpointState::Configured);
        assert_eq!(read.iter().map(|c| c.elements()).collect::<Vec<_>>(), [2, 1]);

        let expected = BufferChunk::concat(DType::FLOAT64, &chunks).unwrap();
        let actual = BufferChunk::concat(DType::FLOAT64, &read).unwrap();
        assert_chunks_equal::<f64>(&expected, &actual);
    }

    #[tokio::test]
    async fn test_drive_source_with_rewind_is_endless() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.bin");
        std::fs::write(&path, bytemuck::cast_slice::<u32, u8>(&[1, 2, 3])).unwrap();

        let mut source = BinaryFileSource::new(DType::UINT32);
        source.set_auto_rewind(true);
        source.set_file_path(path.to_str().unwrap()).await.unwrap();
        source.activate().await.unwrap();
        let mut pool = BufferPool::new(DType::UINT32, 8);
        let chunks: Vec<_> = drive_source(&mut source, &mut pool, info())
            .take(4)
            .try_collect()
            .await
            .unwrap();
        for chunk in &chunks {
            assert_eq!(chunk.as_slice::<u32>(), &[1, 2, 3]);
        }
        // one chunk lent per turn, always recycled
        assert_eq!(pool.allocated(), 1);
    }

    #[tokio::test]
    async fn test_spawned_job_copies_file() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.bin");
        let output = dir.path().join("out.bin");
        let values: Vec<i16> = (0..5000).map(|v| (v * 7) as i16).collect();
        std::fs::write(&input, bytemuck::cast_slice::<i16, u8>(&values)).unwrap();

        let config = PipelineConfig {
            source: SourceConfig {
                dtype: DType::INT16,
                path: input.to_str().unwrap().to_string(),
                rewind: false,
            },
            sink: SinkConfig {
                path: output.to_str().unwrap().to_string(),
                enabled: true,
                append: false,
            },
            max_timeout_ms: 100,
            chunk_elements: 333,
        };
        let job = Job::from_config(&config);
        let job_id = job.job_id.clone();
        let running = job.spawn();
        assert_eq!(running.job_id, job_id);

        let summary = running.wait().await.unwrap();
        assert_eq!(summary, JobSummary { produced: 5000, consumed: 5000 });
        assert_eq!(
            std::fs::read(&output).unwrap(),
            bytemuck::cast_slice::<i16, u8>(&values)
        );
    }

    #[tokio::test]
    async fn test_stop_rewinding_job() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.bin");
        let output = dir.path().join("out.bin");
        std::fs::write(&input, [1u8, 2, 3, 4]).unwrap();

        let mut source = BinaryFileSource::new(DType::UINT8);
        source.set_auto_rewind(true);
        source.set_file_path(input.to_str().unwrap()).await.unwrap();
        let mut sink = BinaryFileSink::new();
        sink.set_file_path(output.to_str().unwrap()).await.unwrap();

        let running = Job::new(source, sink, info(), 4).spawn();
        tokio::time::sleep(Duration::from_millis(50)).await;
        let summary = running.stop().await.unwrap();
        assert_eq!(summary.produced, summary.consumed);
        assert_eq!(summary.produced % 4, 0);

        let written = std::fs::read(&output).unwrap();
        assert_eq!(written.len(), summary.consumed);
        assert!(written.chunks(4).all(|c| c == [1, 2, 3, 4]));
    }
}
