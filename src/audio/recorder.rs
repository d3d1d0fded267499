use crate::defaults;
use crate::error::{RehearseError, Result};

/// Trait for audio source devices.
///
/// This trait allows swapping implementations (real audio device vs mock).
pub trait AudioSource: Send {
    /// Start capturing audio from the source.
    fn start(&mut self) -> Result<()>;

    /// Stop capturing audio and release the device.
    ///
    /// Stopping an already-stopped source is a no-op.
    fn stop(&mut self) -> Result<()>;

    /// Drain the samples captured since the last read.
    ///
    /// # Returns
    /// Vector of 16-bit PCM mono samples, possibly empty
    fn read_samples(&mut self) -> Result<Vec<i16>>;

    /// Human-readable device label for logs and errors.
    fn label(&self) -> &str {
        "audio"
    }
}

/// Processing requested from the capture backend.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AudioConstraints {
    pub sample_rate: u32,
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
}

impl Default for AudioConstraints {
    fn default() -> Self {
        Self {
            sample_rate: defaults::SAMPLE_RATE,
            echo_cancellation: true,
            noise_suppression: true,
        }
    }
}

/// Mock audio source for testing
#[derive(Debug, Clone)]
pub struct MockAudioSource {
    is_started: bool,
    samples: Vec<i16>,
    reads_remaining: Option<usize>,
    should_fail_start: bool,
    should_fail_read: bool,
    error_message: String,
    stop_calls: usize,
}

impl MockAudioSource {
    /// Create a new mock audio source with default settings
    pub fn new() -> Self {
        Self {
            is_started: false,
            samples: vec![0i16; 160],
            reads_remaining: None,
            should_fail_start: false,
            should_fail_read: false,
            error_message: "mock audio error".to_string(),
            stop_calls: 0,
        }
    }

    /// Configure the mock to return specific samples on every read
    pub fn with_samples(mut self, samples: Vec<i16>) -> Self {
        self.samples = samples;
        self
    }

    /// Return samples for only `reads` reads, then empty buffers
    pub fn with_read_limit(mut self, reads: usize) -> Self {
        self.reads_remaining = Some(reads);
        self
    }

    /// Configure the mock to fail on start
    pub fn with_start_failure(mut self) -> Self {
        self.should_fail_start = true;
        self
    }

    /// Configure the mock to fail on read
    pub fn with_read_failure(mut self) -> Self {
        self.should_fail_read = true;
        self
    }

    /// Configure the error message for failures
    pub fn with_error_message(mut self, message: &str) -> Self {
        self.error_message = message.to_string();
        self
    }

    /// Check if the audio source is started
    pub fn is_started(&self) -> bool {
        self.is_started
    }

    /// Number of times `stop` was called
    pub fn stop_calls(&self) -> usize {
        self.stop_calls
    }

    fn failure(&self) -> RehearseError {
        RehearseError::DeviceUnavailable {
            device: "mock microphone".to_string(),
            message: self.error_message.clone(),
        }
    }
}

impl Default for MockAudioSource {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioSource for MockAudioSource {
    fn start(&mut self) -> Result<()> {
        if self.should_fail_start {
            Err(self.failure())
        } else {
            self.is_started = true;
            Ok(())
        }
    }

    fn stop(&mut self) -> Result<()> {
        self.stop_calls += 1;
        self.is_started = false;
        Ok(())
    }

    fn read_samples(&mut self) -> Result<Vec<i16>> {
        if self.should_fail_read {
            return Err(self.failure());
        }
        match self.reads_remaining.as_mut() {
            Some(0) => Ok(Vec::new()),
            Some(n) => {
                *n -= 1;
                Ok(self.samples.clone())
            }
            None => Ok(self.samples.clone()),
        }
    }

    fn label(&self) -> &str {
        "mock microphone"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_audio_source_returns_configured_samples() {
        let test_samples = vec![100i16, 200, 300, 400, 500];
        let mut source = MockAudioSource::new().with_samples(test_samples.clone());

        let result = source.read_samples();

        assert_eq!(result.unwrap(), test_samples);
    }

    #[test]
    fn test_mock_audio_source_returns_default_samples() {
        let mut source = MockAudioSource::new();

        let samples = source.read_samples().unwrap();
        assert_eq!(samples.len(), 160);
        assert!(samples.iter().all(|&s| s == 0));
    }

    #[test]
    fn test_mock_audio_source_read_limit() {
        let mut source = MockAudioSource::new()
            .with_samples(vec![1, 2])
            .with_read_limit(2);

        assert_eq!(source.read_samples().unwrap(), vec![1, 2]);
        assert_eq!(source.read_samples().unwrap(), vec![1, 2]);
        assert!(source.read_samples().unwrap().is_empty());
    }

    #[test]
    fn test_mock_audio_source_returns_read_error_when_configured() {
        let mut source = MockAudioSource::new()
            .with_read_failure()
            .with_error_message("buffer overflow");

        match source.read_samples() {
            Err(RehearseError::DeviceUnavailable { message, .. }) => {
                assert_eq!(message, "buffer overflow");
            }
            _ => panic!("Expected DeviceUnavailable error"),
        }
    }

    #[test]
    fn test_mock_audio_source_start_stop_state_management() {
        let mut source = MockAudioSource::new();

        assert!(!source.is_started());
        source.start().unwrap();
        assert!(source.is_started());
        source.stop().unwrap();
        assert!(!source.is_started());
        assert_eq!(source.stop_calls(), 1);
    }

    #[test]
    fn test_mock_audio_source_start_failure() {
        let mut source = MockAudioSource::new().with_start_failure();

        assert!(source.start().is_err());
        assert!(!source.is_started());
    }

    #[test]
    fn test_audio_constraints_default() {
        let constraints = AudioConstraints::default();
        assert_eq!(constraints.sample_rate, 16000);
        assert!(constraints.echo_cancellation);
        assert!(constraints.noise_suppression);
    }

    #[test]
    fn test_audio_source_trait_is_object_safe() {
        let mut source: Box<dyn AudioSource> =
            Box::new(MockAudioSource::new().with_samples(vec![1i16, 2, 3]));

        assert!(source.start().is_ok());
        assert_eq!(source.read_samples().unwrap(), vec![1i16, 2, 3]);
        assert!(source.stop().is_ok());
        assert_eq!(source.label(), "mock microphone");
    }
}
