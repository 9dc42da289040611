//! Typed fetches for the task and project lists.

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::models::{Page, Project, Task};

use super::{ApiError, SessionClient};

const TASKS_PATH: &str = "/tasks/";
const PROJECTS_PATH: &str = "/projects/";

/// Everything the dashboard view shows.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Dashboard {
    pub tasks: Page<Task>,
    pub projects: Page<Project>,
}

impl SessionClient {
    pub async fn fetch_tasks(&self) -> Result<Page<Task>, ApiError> {
        let page: Page<Task> = self.get_json(TASKS_PATH).await?;
        debug!(count = page.count, returned = page.results.len(), "Fetched tasks");
        Ok(page)
    }

    pub async fn fetch_projects(&self) -> Result<Page<Project>, ApiError> {
        let page: Page<Project> = self.get_json(PROJECTS_PATH).await?;
        debug!(count = page.count, returned = page.results.len(), "Fetched projects");
        Ok(page)
    }

    /// Fetch tasks and projects concurrently. Either failing fails the load.
    pub async fn fetch_dashboard(&self) -> Result<Dashboard, ApiError> {
        let (tasks, projects) = futures::try_join!(self.fetch_tasks(), self.fetch_projects())?;
        Ok(Dashboard { tasks, projects })
    }

    /// Fetch the page the server linked as `next`, if any.
    pub async fn fetch_next<T: DeserializeOwned>(
        &self,
        page: &Page<T>,
    ) -> Result<Option<Page<T>>, ApiError> {
        match page.next {
            Some(ref next) => self.get_json(next).await.map(Some),
            None => Ok(None),
        }
    }
}
