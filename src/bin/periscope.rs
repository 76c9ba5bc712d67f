//! periscope: one-shot analytics query runner
//!
//! Reads a single JSON request from stdin, runs it against the configured
//! storage and prints the JSON result to stdout.
//!
//! ## Requests
//! ```text
//! {"type": "retention", "team_id": 1, "filter": {"period": "Week", ...}}
//! {"type": "sessions", "team_id": 1, "sessions": [...], "filter": {...}, "viewed": ["s1"]}
//! {"type": "recording", "team_id": 1, "session_id": "s1"}
//! ```
//!
//! ## Configuration
//! - First argument: path to a YAML config file (optional)
//! - PERISCOPE_CONFIG: path to a YAML config file (optional)
//! - PERISCOPE__STORAGE__TYPE etc.: per-key overrides
//! - PERISCOPE_LOG: log filter (default: info), written to stderr

use std::collections::HashSet;
use std::io::Read;

use serde::Deserialize;
use tracing::info;

use periscope::config::Config;
use periscope::interfaces::TeamId;
use periscope::replay::{RecordingFilter, SessionSpan};
use periscope::retention::RetentionFilter;
use periscope::services::{RetentionService, SessionRecordingService};
use periscope::storage::init_storage;
use periscope::utils::bootstrap::{connect_with_retry, init_tracing};

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Request {
    Retention {
        team_id: TeamId,
        #[serde(default)]
        filter: RetentionFilter,
    },
    Sessions {
        team_id: TeamId,
        sessions: Vec<SessionSpan>,
        #[serde(default)]
        filter: RecordingFilter,
        #[serde(default)]
        viewed: HashSet<String>,
    },
    Recording {
        team_id: TeamId,
        session_id: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let config_path = std::env::args().nth(1);
    let config = Config::load(config_path.as_deref())?;

    let mut input = String::new();
    std::io::stdin().read_to_string(&mut input)?;
    let request: Request = serde_json::from_str(&input)?;

    let backend = config.storage.storage_type.to_string();
    let stores = connect_with_retry(&backend, config.storage.connect_retries, || {
        init_storage(&config.storage)
    })
    .await?;

    info!(backend = %backend, "periscope started");

    let output = match request {
        Request::Retention { team_id, filter } => {
            let service = RetentionService::with_config(
                stores.events,
                stores.actions,
                config.retention.clone(),
                &config.query,
            );
            serde_json::to_value(service.calculate(team_id, &filter).await?)?
        }
        Request::Sessions {
            team_id,
            sessions,
            filter,
            viewed,
        } => {
            let service = SessionRecordingService::with_config(stores.recordings, &config.query);
            serde_json::to_value(
                service
                    .filter_sessions_by_recordings(team_id, &sessions, &filter, &viewed)
                    .await?,
            )?
        }
        Request::Recording {
            team_id,
            session_id,
        } => {
            let service = SessionRecordingService::with_config(stores.recordings, &config.query);
            serde_json::to_value(service.load_recording(team_id, &session_id).await?)?
        }
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
