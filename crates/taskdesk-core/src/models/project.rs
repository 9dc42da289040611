use serde::{Deserialize, Serialize};

use super::{TaskStatus, User};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct Sprint {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct Project {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub owner: Option<User>,
    #[serde(default)]
    pub members: Vec<User>,
    #[serde(default)]
    pub statuses: Vec<TaskStatus>,
    #[serde(default)]
    pub sprints: Vec<Sprint>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

impl Project {
    pub fn display_member_count(&self) -> String {
        match self.members.len() {
            1 => "1 member".to_string(),
            n => format!("{} members", n),
        }
    }

    pub fn owner_label(&self) -> String {
        self.owner
            .as_ref()
            .map(User::display_name)
            .unwrap_or_else(|| "No owner".to_string())
    }
}
