use crate::error::ClientError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A podcast episode as stored by the API service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PodcastItem {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub thumbnail: String,
    #[serde(default)]
    pub duration_in_milliseconds: i64,
    #[serde(default)]
    pub video_url: String,
    /// Location of the audio file on the API host; its parent directory names the feed
    #[serde(default)]
    pub audio_file_path: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Body of `POST /v1/addItems`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddItemsRequest {
    pub urls: Vec<String>,
}

/// Result of a read operation that may have fallen back to an empty value.
///
/// `degradation` is set (to a [`ClientError::GracefulDegradation`]) only when
/// the circuit breaker refused the call and the API was never reached.
#[derive(Debug)]
pub struct Degradable<T> {
    pub data: T,
    pub degradation: Option<ClientError>,
}

impl<T> Degradable<T> {
    pub fn fresh(data: T) -> Self {
        Self {
            data,
            degradation: None,
        }
    }

    pub fn degraded(data: T, cause: ClientError) -> Self {
        Self {
            data,
            degradation: Some(cause),
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.degradation.is_some()
    }

    pub fn into_inner(self) -> T {
        self.data
    }
}
