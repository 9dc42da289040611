//! Data models for the task service.
//!
//! - `User`: account profile embedded in tasks and projects
//! - `Task`, `TaskStatus`, `Priority`: work items and their workflow state
//! - `Project`, `Sprint`: projects with their members and sprints
//! - `Page`: the paginated envelope every list endpoint returns

pub mod page;
pub mod project;
pub mod task;
pub mod user;

pub use page::Page;
pub use project::{Project, Sprint};
pub use task::{
    Attachment, Comment, HistoryEntry, Priority, ProjectRef, SprintRef, Task, TaskStatus,
};
pub use user::User;
