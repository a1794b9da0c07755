//! Integration tests for the job orchestrator
//!
//! Payloads are synthesised in memory with `hound`. The external encoder is
//! replaced by mocks so no codec tool is needed.

use async_trait::async_trait;
use bytes::Bytes;
use core_decoder::decode;
use core_runtime::{ResourceLimits, ServiceConfig};
use core_service::{
    FailureKind, JobRequest, JobState, Operation, Orchestrator, ProcessingResult, StatusClass,
};
use core_transcode::{ExternalEncoder, OutputContainer, TargetFormat, TranscodeError};
use mockall::mock;
use std::f32::consts::PI;
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

mock! {
    pub Encoder {}

    #[async_trait]
    impl ExternalEncoder for Encoder {
        async fn encode(
            &self,
            wav: Bytes,
            target: &TargetFormat,
            deadline: Instant,
        ) -> core_transcode::Result<Bytes>;
    }
}

/// Encoder that takes `delay` to answer, giving up at the deadline the way a
/// real codec process is bounded.
struct SlowEncoder {
    delay: Duration,
}

#[async_trait]
impl ExternalEncoder for SlowEncoder {
    async fn encode(
        &self,
        _wav: Bytes,
        _target: &TargetFormat,
        deadline: Instant,
    ) -> core_transcode::Result<Bytes> {
        let started = Instant::now();
        let finish = started + self.delay;
        if finish > deadline {
            tokio::time::sleep_until(deadline).await;
            return Err(TranscodeError::Timeout {
                elapsed: started.elapsed(),
            });
        }
        tokio::time::sleep_until(finish).await;
        Ok(Bytes::from_static(b"ID3\x04encoded"))
    }
}

fn sine_wav(sample_rate: u32, channels: u16, seconds: f32) -> Bytes {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let frames = (seconds * sample_rate as f32) as usize;
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        for n in 0..frames {
            let value = (2.0 * PI * 440.0 * n as f32 / sample_rate as f32).sin() * 0.5;
            for _ in 0..channels {
                writer.write_sample((value * i16::MAX as f32) as i16).unwrap();
            }
        }
        writer.finalize().unwrap();
    }
    Bytes::from(cursor.into_inner())
}

fn config(workers: usize, queue_depth: usize, max_seconds: Duration) -> Arc<ServiceConfig> {
    ServiceConfig::default()
        .with_limits(ResourceLimits::default().with_max_seconds(max_seconds))
        .with_workers(workers)
        .with_queue_depth(queue_depth)
        .freeze()
        .unwrap()
}

fn unused_encoder() -> Arc<dyn ExternalEncoder> {
    let mut mock = MockEncoder::new();
    mock.expect_encode().never();
    Arc::new(mock)
}

fn orchestrator() -> Orchestrator {
    Orchestrator::with_encoder(config(2, 2, Duration::from_secs(30)), unused_encoder())
}

#[tokio::test]
async fn test_decode_only_describes_stream() {
    let outcome = orchestrator()
        .submit(
            JobRequest::new(Operation::DecodeOnly),
            vec![sine_wav(22_050, 2, 1.0)],
        )
        .await;

    assert!(outcome.is_success());
    assert_eq!(outcome.state, JobState::Completed);
    let report = outcome.features().unwrap();
    assert_eq!(report.get("sample_rate"), Some(22_050.0));
    assert_eq!(report.get("channels"), Some(2.0));
    assert_eq!(report.get("frames"), Some(22_050.0));
    assert_eq!(report.get("bits_per_sample"), Some(16.0));

    let states: Vec<_> = outcome.history.iter().map(|t| t.to).collect();
    assert_eq!(
        states,
        vec![
            JobState::Validated,
            JobState::Decoded,
            JobState::Processed,
            JobState::Completed
        ]
    );
}

#[tokio::test]
async fn test_analyze_returns_features() {
    let outcome = orchestrator()
        .submit(
            JobRequest::new(Operation::Analyze),
            vec![sine_wav(44_100, 1, 1.0)],
        )
        .await;

    let report = outcome.features().unwrap();
    let duration = report.get("duration_seconds").unwrap();
    assert!((duration - 1.0).abs() < 1e-6);
    let centroid = report.get("spectral_centroid").unwrap();
    assert!((centroid - 440.0).abs() < 100.0, "centroid = {}", centroid);
    assert!(report.failures.is_empty());
}

#[tokio::test]
async fn test_transcode_to_wav_round_trips() {
    let target = TargetFormat::wav().with_sample_rate(16_000).with_channels(1);
    let outcome = orchestrator()
        .submit(
            JobRequest::new(Operation::Transcode { target }),
            vec![sine_wav(32_000, 2, 0.5)],
        )
        .await;

    let artifact = outcome.artifact().unwrap();
    assert_eq!(artifact.container, OutputContainer::Wav);
    assert_eq!(artifact.content_type(), "audio/wav");

    let decoded = decode(artifact.bytes.clone(), &ResourceLimits::default()).unwrap();
    assert_eq!(decoded.sample_rate(), 16_000);
    assert_eq!(decoded.channels(), 1);
    assert!((decoded.frames() as i64 - 8_000).abs() <= 1);
}

#[tokio::test]
async fn test_transcode_to_mp3_uses_external_encoder() {
    let mut mock = MockEncoder::new();
    mock.expect_encode()
        .withf(|wav, target, _| wav.starts_with(b"RIFF") && target.effective_bitrate() == Some(128))
        .times(1)
        .returning(|_, _, _| Ok(Bytes::from_static(b"ID3\x04encoded")));

    let orchestrator =
        Orchestrator::with_encoder(config(1, 1, Duration::from_secs(30)), Arc::new(mock));
    let outcome = orchestrator
        .submit(
            JobRequest::new(Operation::Transcode {
                target: TargetFormat::mp3(),
            }),
            vec![sine_wav(44_100, 2, 0.25)],
        )
        .await;

    let artifact = outcome.artifact().unwrap();
    assert_eq!(artifact.content_type(), "audio/mpeg");
    assert_eq!(artifact.bytes, Bytes::from_static(b"ID3\x04encoded"));
    assert_eq!(artifact.channels, 2);
}

#[tokio::test]
async fn test_mashup_joins_leading_segments() {
    let mut mock = MockEncoder::new();
    mock.expect_encode()
        .withf(|_, target, _| target.container == OutputContainer::Mp3)
        .times(1)
        .returning(|_, _, _| Ok(Bytes::from_static(b"ID3\x04mashup")));

    let orchestrator =
        Orchestrator::with_encoder(config(1, 1, Duration::from_secs(30)), Arc::new(mock));
    let request = JobRequest::from_json(r#"{ "operation": { "type": "mashup", "segment_seconds": 1.5 } }"#)
        .unwrap();
    let outcome = orchestrator
        .submit(
            request,
            vec![
                sine_wav(8_000, 1, 2.0),
                sine_wav(8_000, 1, 1.0),
                sine_wav(16_000, 2, 3.0),
            ],
        )
        .await;

    assert!(outcome.is_success(), "{:?}", outcome.failure());
    let artifact = outcome.artifact().unwrap();
    // Every segment is lifted to the richest input's layout
    assert_eq!(artifact.sample_rate, 16_000);
    assert_eq!(artifact.channels, 2);
    // 1.5 s + the whole 1 s input + 1.5 s
    assert!((artifact.frames as i64 - 64_000).abs() <= 2, "frames = {}", artifact.frames);
}

#[tokio::test]
async fn test_mashup_fails_when_any_input_is_bad() {
    let outcome = orchestrator()
        .submit(
            JobRequest::new(Operation::Mashup {
                segment_seconds: 1.0,
                target: Some(TargetFormat::wav()),
            }),
            vec![sine_wav(8_000, 1, 2.0), Bytes::from_static(b"definitely not audio")],
        )
        .await;

    assert_eq!(outcome.state, JobState::Failed);
    assert_eq!(outcome.failure().unwrap().kind, FailureKind::UnsupportedFormat);
}

#[tokio::test]
async fn test_jobs_beyond_capacity_are_rejected() {
    let orchestrator = Arc::new(Orchestrator::with_encoder(
        config(1, 0, Duration::from_secs(30)),
        Arc::new(SlowEncoder {
            delay: Duration::from_millis(500),
        }),
    ));

    let first = tokio::spawn({
        let orchestrator = orchestrator.clone();
        async move {
            orchestrator
                .submit(
                    JobRequest::new(Operation::Transcode {
                        target: TargetFormat::mp3(),
                    }),
                    vec![sine_wav(8_000, 1, 0.5)],
                )
                .await
        }
    });

    let waited = Instant::now();
    while orchestrator.available_capacity() > 0 {
        assert!(waited.elapsed() < Duration::from_secs(5), "first job never admitted");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let rejected = orchestrator
        .submit(
            JobRequest::new(Operation::DecodeOnly),
            vec![sine_wav(8_000, 1, 0.5)],
        )
        .await;

    let failure = rejected.failure().unwrap();
    assert_eq!(failure.kind, FailureKind::ServiceBusy);
    assert_eq!(failure.http_status(), 503);
    assert_eq!(rejected.state, JobState::Failed);
    assert_eq!(rejected.history.len(), 1);

    let first = first.await.unwrap();
    assert!(first.is_success(), "{:?}", first.failure());
    assert_eq!(orchestrator.available_capacity(), 1);
}

#[tokio::test]
async fn test_stalled_encoder_is_transcode_timeout() {
    let orchestrator = Orchestrator::with_encoder(
        config(1, 1, Duration::from_millis(300)),
        Arc::new(SlowEncoder {
            delay: Duration::from_secs(30),
        }),
    );

    let outcome = orchestrator
        .submit(
            JobRequest::new(Operation::Transcode {
                target: TargetFormat::new(OutputContainer::Ogg),
            }),
            vec![sine_wav(8_000, 1, 0.25)],
        )
        .await;

    let failure = outcome.failure().unwrap();
    assert_eq!(failure.kind, FailureKind::TranscodeTimeout);
    assert_eq!(failure.kind.status_class(), StatusClass::ServiceUnavailable);
    assert!(outcome.elapsed < Duration::from_secs(5));
}

#[tokio::test]
async fn test_slow_cpu_stage_is_job_timeout() {
    let orchestrator =
        Orchestrator::with_encoder(config(1, 1, Duration::from_millis(1)), unused_encoder());

    let outcome = orchestrator
        .submit(
            JobRequest::new(Operation::Analyze),
            vec![sine_wav(44_100, 2, 20.0)],
        )
        .await;

    let failure = outcome.failure().unwrap();
    assert_eq!(failure.kind, FailureKind::JobTimeout);
    assert_eq!(failure.http_status(), 503);
    assert_eq!(outcome.state, JobState::Failed);
}

#[tokio::test]
async fn test_failure_kinds_and_statuses() {
    let orchestrator = orchestrator();

    let cases = vec![
        (
            Operation::DecodeOnly,
            vec![Bytes::from_static(b"\x00\x01\x02\x03 unknown")],
            FailureKind::UnsupportedFormat,
            415,
        ),
        (
            Operation::Analyze,
            vec![sine_wav(8_000, 1, 0.1), sine_wav(8_000, 1, 0.1)],
            FailureKind::InvalidRequest,
            400,
        ),
        (
            Operation::Transcode {
                target: TargetFormat::wav().with_channels(6),
            },
            vec![sine_wav(8_000, 2, 0.1)],
            FailureKind::UnsupportedChannelLayout,
            422,
        ),
        (
            Operation::Transcode {
                target: TargetFormat::wav().with_bitrate(192),
            },
            vec![sine_wav(8_000, 2, 0.1)],
            FailureKind::InvalidRequest,
            400,
        ),
    ];

    for (operation, payloads, kind, status) in cases {
        let outcome = orchestrator.submit(JobRequest::new(operation), payloads).await;
        assert!(matches!(outcome.result, ProcessingResult::Failure(_)));
        assert_eq!(outcome.failure().unwrap().kind, kind);
        assert_eq!(outcome.result.http_status(), status);
    }
}

#[tokio::test]
async fn test_truncated_payload_is_decode_error() {
    let wav = sine_wav(8_000, 1, 1.0);
    let truncated = wav.slice(..wav.len() / 2);

    let outcome = orchestrator()
        .submit(JobRequest::new(Operation::DecodeOnly), vec![truncated])
        .await;

    let failure = outcome.failure().unwrap();
    assert_eq!(failure.kind, FailureKind::DecodeError);
    assert_eq!(failure.http_status(), 422);
    assert!(failure.message.contains("truncated"), "{}", failure.message);
}

#[tokio::test]
async fn test_oversized_payload_is_rejected_before_decoding() {
    let config = ServiceConfig::default()
        .with_limits(ResourceLimits::default().with_max_bytes(1_024))
        .freeze()
        .unwrap();
    let orchestrator = Orchestrator::with_encoder(config, unused_encoder());

    let outcome = orchestrator
        .submit(
            JobRequest::new(Operation::DecodeOnly),
            vec![sine_wav(8_000, 1, 1.0)],
        )
        .await;

    assert_eq!(outcome.failure().unwrap().kind, FailureKind::PayloadTooLarge);
    assert_eq!(outcome.result.http_status(), 413);
    assert_eq!(outcome.history.last().map(|t| t.from), Some(JobState::Received));
}
