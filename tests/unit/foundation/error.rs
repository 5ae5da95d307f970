use super::*;

#[test]
fn display_prefixes_are_stable() {
    assert!(
        JobError::config("x")
            .to_string()
            .contains("invalid job config:")
    );
    assert!(
        JobError::closed(Stage::Transform)
            .to_string()
            .contains("transform stage: channel closed")
    );
    assert!(
        JobError::internal(Stage::Sequence, "gap")
            .to_string()
            .contains("sequence stage: internal error: gap")
    );
    assert!(
        JobError::Timeout {
            deadline: Duration::from_millis(50)
        }
        .to_string()
        .contains("deadline")
    );
}

#[test]
fn transform_failure_keeps_index_and_source() {
    let err = JobError::from(TransformFailure {
        index: FrameIndex(7),
        source: anyhow::anyhow!("model exploded"),
    });
    assert_eq!(err.frame_index(), Some(FrameIndex(7)));
    assert_eq!(err.stage(), Stage::Transform);
    let msg = err.to_string();
    assert!(msg.contains("frame 7"), "{msg}");
    assert!(msg.contains("model exploded"), "{msg}");
}

#[test]
fn decode_error_reports_progress() {
    let err = JobError::from(DecodeError {
        frames_read: 12,
        source: anyhow::Error::new(std::io::Error::other("truncated")),
    });
    assert_eq!(err.stage(), Stage::Source);
    assert!(err.to_string().contains("after 12 frame(s)"));
    assert!(err.to_string().contains("truncated"));
}

#[test]
fn only_channel_closed_is_a_symptom() {
    assert!(JobError::closed(Stage::Source).is_symptom());
    assert!(!JobError::Cancelled.is_symptom());
    assert!(!JobError::Encode(anyhow::anyhow!("x")).is_symptom());
}
