use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::{info, warn};

const DEFAULT_LAUNCH: &str = "videotestsrc name=%_chunk_video \
    ! video/x-raw,width=1920,height=1080,format=I420 \
    ! clockoverlay \
    ! x264enc tune=zerolatency bitrate=8000 \
    ! tee name=vtee \
    vtee. ! queue ! avdec_h264 ! videoconvert ! videoscale ! autovideosink \
    vtee. ! queue name=%_chunk_vrecq ! mp4mux name=%_chunk_mux \
    ! filesink async=false name=%_chunk_filesink";

const LEAKY_MODES: [&str; 3] = ["no", "upstream", "downstream"];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read configuration file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse configuration file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub app: AppConfig,
    pub pipeline: PipelineConfig,
    pub recording: RecordingConfig,
    pub queue: QueueConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    pub name: String,
    pub log_level: String,
}

/// Textual pipeline description and the names of the nodes the recorder
/// steers. Every `%` in the templates is replaced with `name`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub name: String,
    pub launch: String,
    pub queue: String,
    pub muxer: String,
    pub writer: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RecordingConfig {
    pub location_prefix: String,
    pub extension: String,
    pub record_duration_seconds: u64,
    pub gap_duration_seconds: u64,
    /// Delay before the first segment opens.
    pub priming_seconds: u64,
    /// How long a shutdown waits for the last segment to finish.
    pub drain_timeout_seconds: u64,
    /// Status log period, 0 disables it.
    pub status_interval_seconds: u64,
}

/// Tuning for the recording queue, which has to hold a full gap of video
/// while the gate is closed.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct QueueConfig {
    pub max_size_time_seconds: u64,
    pub max_size_bytes: u32,
    pub max_size_buffers: u32,
    pub leaky: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: "Chunk Recorder".to_string(),
            log_level: "info".to_string(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            name: "test".to_string(),
            launch: DEFAULT_LAUNCH.to_string(),
            queue: "%_chunk_vrecq".to_string(),
            muxer: "%_chunk_mux".to_string(),
            writer: "%_chunk_filesink".to_string(),
        }
    }
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            location_prefix: "/tmp/recording".to_string(),
            extension: "mp4".to_string(),
            record_duration_seconds: 5,
            gap_duration_seconds: 10,
            priming_seconds: 0,
            drain_timeout_seconds: 5,
            status_interval_seconds: 0,
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_size_time_seconds: 5,
            max_size_bytes: 0,
            max_size_buffers: 0,
            leaky: "downstream".to_string(),
        }
    }
}

impl PipelineConfig {
    fn substitute(&self, template: &str) -> String {
        template.replace('%', &self.name)
    }

    pub fn launch_description(&self) -> String {
        self.substitute(&self.launch)
    }

    pub fn queue_name(&self) -> String {
        self.substitute(&self.queue)
    }

    pub fn muxer_name(&self) -> String {
        self.substitute(&self.muxer)
    }

    pub fn writer_name(&self) -> String {
        self.substitute(&self.writer)
    }

    /// Queue, muxer and writer names after substitution.
    pub fn element_names(&self) -> [String; 3] {
        [self.queue_name(), self.muxer_name(), self.writer_name()]
    }
}

impl Config {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pipeline.name.is_empty() {
            return Err(ConfigError::Invalid("pipeline name must not be empty".to_string()));
        }

        let launch = self.pipeline.launch_description();
        for element in self.pipeline.element_names() {
            if element.is_empty() {
                return Err(ConfigError::Invalid("element names must not be empty".to_string()));
            }
            if !launch.contains(&format!("name={}", element)) {
                return Err(ConfigError::Invalid(format!(
                    "pipeline description does not define element {}",
                    element
                )));
            }
        }

        let recording = &self.recording;
        if recording.location_prefix.is_empty() {
            return Err(ConfigError::Invalid("location_prefix must not be empty".to_string()));
        }
        if recording.extension.is_empty() {
            return Err(ConfigError::Invalid("extension must not be empty".to_string()));
        }
        if recording.record_duration_seconds == 0 {
            return Err(ConfigError::Invalid(
                "record_duration_seconds must be greater than 0".to_string(),
            ));
        }
        if recording.drain_timeout_seconds == 0 {
            return Err(ConfigError::Invalid(
                "drain_timeout_seconds must be greater than 0".to_string(),
            ));
        }

        if !LEAKY_MODES.contains(&self.queue.leaky.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "queue leaky must be one of {:?}, got {}",
                LEAKY_MODES, self.queue.leaky
            )));
        }
        if self.queue.max_size_time_seconds < recording.gap_duration_seconds {
            warn!(
                "Recording queue holds {}s but the gap is {}s, older buffers will be dropped",
                self.queue.max_size_time_seconds, recording.gap_duration_seconds
            );
        }

        Ok(())
    }

    pub async fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Io {
                path: path.display().to_string(),
                source,
            })?;

        let config: Config = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;

        config.validate()?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Load `path` if given, defaults otherwise.
    pub async fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::from_file(path).await,
            None => {
                info!("No configuration file given, using defaults");
                Ok(Self::default())
            }
        }
    }
}
