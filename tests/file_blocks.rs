use std::time::Duration;

use filestream::buffer::{assert_chunks_close, assert_chunks_equal, BufferChunk};
use filestream::connector::{BinaryFileSink, BinaryFileSource, EndpointState, StreamBlock};
use filestream::stream::{read_all, write_all, WorkInfo, DEFAULT_CHUNK_ELEMENTS};
use filestream::testing::{CollectorSink, FeederSource, TestPlan};
use filestream::types::{Complex, DType};
use test_case::test_case;

fn info() -> WorkInfo {
    let _ = env_logger::builder().is_test(true).try_init();
    WorkInfo::new(Duration::from_secs(1))
}

async fn blocks_on(path: &str, dtype: DType) -> (BinaryFileSource, BinaryFileSink) {
    let mut source = BinaryFileSource::new(dtype);
    source.set_file_path(path).await.unwrap();
    let mut sink = BinaryFileSink::new();
    sink.set_file_path(path).await.unwrap();
    (source, sink)
}

#[tokio::test]
async fn test_binary_file_blocks() {
    let file = tempfile::NamedTempFile::new().unwrap();
    let path = file.path().to_str().unwrap();
    let (mut source, mut sink) = blocks_on(path, DType::INT32).await;

    let plan = TestPlan::from_json(
        r#"{
            "enableBuffers": true,
            "minTrials": 100,
            "maxTrials": 200,
            "minSize": 512,
            "maxSize": 2048
        }"#,
    )
    .unwrap();
    let expected = FeederSource::new(DType::INT32)
        .feed_test_plan(&plan)
        .unwrap();
    let total: usize = expected.iter().map(BufferChunk::elements).sum();

    let written = write_all(&mut sink, info(), DType::INT32, &expected)
        .await
        .unwrap();
    assert_eq!(written, total);
    assert_eq!(sink.state(), EndpointState::Configured);

    let mut collector = CollectorSink::new(DType::INT32);
    for chunk in read_all(&mut source, info(), DEFAULT_CHUNK_ELEMENTS)
        .await
        .unwrap()
    {
        assert!(chunk.elements() <= DEFAULT_CHUNK_ELEMENTS);
        collector.push(chunk).unwrap();
    }
    assert_eq!(source.state(), EndpointState::Configured);
    collector.verify::<i32>(&expected).unwrap();
}

#[test_case(DType::INT8; "int8")]
#[test_case(DType::UINT16; "uint16")]
#[test_case(DType::INT64; "int64")]
#[test_case(DType::COMPLEX_INT16; "complex int16")]
#[test_case(DType::COMPLEX_INT64; "complex int64")]
#[tokio::test]
async fn test_round_trip_integral(dtype: DType) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data.bin");
    let (mut source, mut sink) = blocks_on(path.to_str().unwrap(), dtype).await;

    let plan = TestPlan {
        enable_buffers: true,
        min_trials: 5,
        max_trials: 10,
        min_size: 1,
        max_size: 300,
        seed: Some(42),
    };
    let expected = FeederSource::new(dtype).feed_test_plan(&plan).unwrap();
    write_all(&mut sink, info(), dtype, &expected).await.unwrap();

    let read = read_all(&mut source, info(), 64).await.unwrap();
    let expected = BufferChunk::concat(dtype, &expected).unwrap();
    let actual = BufferChunk::concat(dtype, &read).unwrap();
    assert_eq!(actual.as_bytes(), expected.as_bytes());
}

#[tokio::test]
async fn test_round_trip_float() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data.bin");
    let (mut source, mut sink) = blocks_on(path.to_str().unwrap(), DType::FLOAT32).await;

    let expected = BufferChunk::from_slice(&[0.5f32, -1.25, 3.0e-7, f32::INFINITY]).unwrap();
    write_all(&mut sink, info(), DType::FLOAT32, [&expected])
        .await
        .unwrap();
    let read = read_all(&mut source, info(), 3).await.unwrap();
    assert_eq!(read.len(), 2);
    let actual = BufferChunk::concat(DType::FLOAT32, &read).unwrap();
    assert_chunks_close::<f32>(&expected, &actual, 1e-6);
}

#[tokio::test]
async fn test_round_trip_complex_double() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data.bin");
    let dtype = DType::COMPLEX_FLOAT64;
    let (mut source, mut sink) = blocks_on(path.to_str().unwrap(), dtype).await;

    let plan = TestPlan {
        enable_buffers: true,
        min_trials: 3,
        max_trials: 3,
        min_size: 100,
        max_size: 100,
        seed: Some(9),
    };
    let expected = FeederSource::new(dtype).feed_test_plan(&plan).unwrap();
    write_all(&mut sink, info(), dtype, &expected).await.unwrap();
    assert_eq!(std::fs::metadata(&path).unwrap().len(), 300 * 16);

    let read = read_all(&mut source, info(), 128).await.unwrap();
    let expected = BufferChunk::concat(dtype, &expected).unwrap();
    let actual = BufferChunk::concat(dtype, &read).unwrap();
    assert_chunks_close::<Complex<f64>>(&expected, &actual, 1e-12);
}

#[tokio::test]
async fn test_zero_elements() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("empty.bin");
    let (mut source, mut sink) = blocks_on(path.to_str().unwrap(), DType::UINT32).await;

    let written = write_all(&mut sink, info(), DType::UINT32, &[] as &[BufferChunk])
        .await
        .unwrap();
    assert_eq!(written, 0);
    assert_eq!(std::fs::metadata(&path).unwrap().len(), 0);
    assert!(read_all(&mut source, info(), 16).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_deactivate_twice() {
    let file = tempfile::NamedTempFile::new().unwrap();
    let path = file.path().to_str().unwrap();
    let (mut source, mut sink) = blocks_on(path, DType::INT8).await;

    for _ in 0..2 {
        source.activate().await.unwrap();
        sink.activate().await.unwrap();
        assert_eq!(source.state(), EndpointState::Active);
        assert_eq!(sink.state(), EndpointState::Active);
        source.deactivate().await;
        source.deactivate().await;
        sink.deactivate().await;
        sink.deactivate().await;
        assert_eq!(source.state(), EndpointState::Configured);
        assert_eq!(sink.state(), EndpointState::Configured);
    }
}

#[tokio::test]
async fn test_reassign_same_path_while_active() {
    let file = tempfile::NamedTempFile::new().unwrap();
    let path = file.path().to_str().unwrap();
    std::fs::write(path, bytemuck::cast_slice::<i32, u8>(&[1, 2, 3])).unwrap();

    let mut source = BinaryFileSource::new(DType::INT32);
    source.set_file_path(path).await.unwrap();
    source.activate().await.unwrap();
    for _ in 0..3 {
        source.set_file_path(path).await.unwrap();
        assert_eq!(source.state(), EndpointState::Active);
        assert_eq!(source.file_path(), path);
    }
    source.deactivate().await;

    let read = read_all(&mut source, info(), 8).await.unwrap();
    assert_eq!(read.len(), 1);
    assert_chunks_equal::<i32>(&BufferChunk::from_slice(&[1, 2, 3]).unwrap(), &read[0]);
}

#[cfg(unix)]
#[tokio::test]
async fn test_socket_endpoints() {
    use std::os::unix::net::UnixStream;

    let (a, b) = UnixStream::pair().unwrap();
    let mut sink =
        BinaryFileSink::from_std(std::fs::File::from(std::os::fd::OwnedFd::from(a))).unwrap();
    let mut source = BinaryFileSource::from_std(
        DType::UINT16,
        std::fs::File::from(std::os::fd::OwnedFd::from(b)),
    )
    .unwrap();

    let expected = BufferChunk::from_slice(&[7u16, 8, 9, 10]).unwrap();
    let written = write_all(&mut sink, info(), DType::UINT16, [&expected])
        .await
        .unwrap();
    assert_eq!(written, 4);
    // the sink closed its end, so the source sees end of stream
    let read = read_all(&mut source, info(), 16).await.unwrap();
    let actual = BufferChunk::concat(DType::UINT16, &read).unwrap();
    assert_chunks_equal::<u16>(&expected, &actual);
}
