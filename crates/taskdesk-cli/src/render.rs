//! Plain-text rendering of task cards, project lists and notices.

use anyhow::Result;
use crossterm::style::Stylize;
use serde::Serialize;
use taskdesk_core::api::Dashboard;
use taskdesk_core::auth::SessionState;
use taskdesk_core::models::{Page, Project, Task};
use taskdesk_core::utils::truncate_string;

/// Longest description shown on a card before it is cut.
const MAX_DESCRIPTION_LENGTH: usize = 120;

pub fn welcome(state: &SessionState) -> String {
    match state.identity {
        Some(ref identity) => format!("Logged in as {}.", identity.display_name()),
        None => "Logged in.".to_string(),
    }
}

pub fn notice(message: &str) {
    eprintln!("{} {}", "!".yellow().bold(), message);
}

/// Card text for a task, one field per line
pub fn task_card(task: &Task) -> String {
    let mut lines = vec![task.title.clone()];
    if !task.description.is_empty() {
        lines.push(format!(
            "  {}",
            truncate_string(&task.description, MAX_DESCRIPTION_LENGTH)
        ));
    }
    lines.push(format!("  Status: {}", task.status_label()));
    lines.push(format!("  Priority: {}", task.priority));
    lines.push(format!("  Assigned to: {}", task.assignee_label()));
    lines.push(format!("  Deadline: {}", task.deadline_label()));
    lines.join("\n")
}

pub fn project_line(project: &Project) -> String {
    let mut line = format!(
        "{} ({}, owner: {})",
        project.name,
        project.display_member_count(),
        project.owner_label()
    );
    if !project.description.is_empty() {
        line.push_str(&format!(
            "\n  {}",
            truncate_string(&project.description, MAX_DESCRIPTION_LENGTH)
        ));
    }
    line
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_task_section(page: &Page<Task>) {
    println!("{}", "Tasks".bold());
    if page.results.is_empty() {
        println!("No tasks found.");
        return;
    }
    for task in &page.results {
        println!("{}\n", task_card(task));
    }
    if page.has_next() {
        println!("{}", page.summary().dim());
    }
}

fn print_project_section(page: &Page<Project>) {
    println!("{}", "Projects".bold());
    if page.results.is_empty() {
        println!("No projects found.");
        return;
    }
    for project in &page.results {
        println!("- {}", project_line(project));
    }
    if page.has_next() {
        println!("{}", page.summary().dim());
    }
}

pub fn print_tasks(page: &Page<Task>, json: bool) -> Result<()> {
    if json {
        return print_json(page);
    }
    print_task_section(page);
    Ok(())
}

pub fn print_projects(page: &Page<Project>, json: bool) -> Result<()> {
    if json {
        return print_json(page);
    }
    print_project_section(page);
    Ok(())
}

pub fn print_dashboard(dashboard: &Dashboard, json: bool) -> Result<()> {
    if json {
        return print_json(dashboard);
    }
    print_project_section(&dashboard.projects);
    println!();
    print_task_section(&dashboard.tasks);
    Ok(())
}
