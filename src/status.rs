use serde::Serialize;
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Idle,
    Processing,
    Success,
    Error,
}

/// The two stages an upload moves through
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    AudioProcessing,
    FileConversion,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StagePhases {
    pub audio_processing: Phase,
    pub file_conversion: Phase,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StageErrors {
    pub audio_processing: Option<String>,
    pub file_conversion: Option<String>,
}

/// Latest known state of the upload pipeline. No history is kept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusSnapshot {
    pub process_status: StagePhases,
    pub last_errors: StageErrors,
}

impl Default for StatusSnapshot {
    fn default() -> Self {
        StatusSnapshot {
            process_status: StagePhases {
                audio_processing: Phase::Idle,
                file_conversion: Phase::Idle,
            },
            last_errors: StageErrors::default(),
        }
    }
}

/// Process-wide status record shared by the upload and status handlers
#[derive(Debug, Default)]
pub struct StatusTracker {
    inner: Mutex<StatusSnapshot>,
}

impl StatusTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear previous errors and mark the start of a new upload
    pub fn begin_upload(&self) {
        self.update(|s| {
            s.process_status.audio_processing = Phase::Processing;
            s.process_status.file_conversion = Phase::Idle;
            s.last_errors = StageErrors::default();
        });
    }

    pub fn set(&self, stage: Stage, phase: Phase) {
        self.update(|s| match stage {
            Stage::AudioProcessing => s.process_status.audio_processing = phase,
            Stage::FileConversion => s.process_status.file_conversion = phase,
        });
    }

    /// Mark a stage failed and remember why
    pub fn fail(&self, stage: Stage, message: impl Into<String>) {
        let message = message.into();
        self.update(|s| match stage {
            Stage::AudioProcessing => {
                s.process_status.audio_processing = Phase::Error;
                s.last_errors.audio_processing = Some(message);
            }
            Stage::FileConversion => {
                s.process_status.file_conversion = Phase::Error;
                s.last_errors.file_conversion = Some(message);
            }
        });
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        match self.inner.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn update<F: FnOnce(&mut StatusSnapshot)>(&self, f: F) {
        // A panic elsewhere must not freeze status reporting
        let mut guard = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_idle() {
        let tracker = StatusTracker::new();
        let snap = tracker.snapshot();
        assert_eq!(snap.process_status.audio_processing, Phase::Idle);
        assert_eq!(snap.process_status.file_conversion, Phase::Idle);
        assert_eq!(snap.last_errors, StageErrors::default());
    }

    #[test]
    fn test_begin_upload_clears_previous_errors() {
        let tracker = StatusTracker::new();
        tracker.fail(Stage::AudioProcessing, "disk full");
        tracker.fail(Stage::FileConversion, "bad header");

        tracker.begin_upload();

        let snap = tracker.snapshot();
        assert_eq!(snap.process_status.audio_processing, Phase::Processing);
        assert_eq!(snap.process_status.file_conversion, Phase::Idle);
        assert_eq!(snap.last_errors.audio_processing, None);
        assert_eq!(snap.last_errors.file_conversion, None);
    }

    #[test]
    fn test_serialized_shape() {
        let tracker = StatusTracker::new();
        tracker.set(Stage::AudioProcessing, Phase::Success);
        tracker.fail(Stage::FileConversion, "boom");

        let value = serde_json::to_value(tracker.snapshot()).unwrap();
        assert_eq!(value["process_status"]["audio_processing"], "success");
        assert_eq!(value["process_status"]["file_conversion"], "error");
        assert_eq!(value["last_errors"]["file_conversion"], "boom");
        assert!(value["last_errors"]["audio_processing"].is_null());
    }
}
