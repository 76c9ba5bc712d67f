//! Action definition storage interface.

use async_trait::async_trait;

use super::{Result, TeamId};
use crate::retention::Action;

/// Interface for looking up stored actions.
#[async_trait]
pub trait ActionStore: Send + Sync {
    /// Insert or replace an action and all of its steps.
    async fn put_action(&self, action: &Action) -> Result<()>;

    /// Load a non-deleted action with its steps.
    ///
    /// Returns `Ok(None)` when the team has no such action.
    async fn get_action(&self, team_id: TeamId, action_id: i64) -> Result<Option<Action>>;
}
