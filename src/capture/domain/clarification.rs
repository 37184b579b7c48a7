//! Structured clarification results and their rendering into task entries.

use super::{CaptureDomainError, CaptureId};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Classification assigned by the clarifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClarificationKind {
    /// A multi-step outcome that becomes a project task.
    Project,
    /// A single concrete next action.
    #[serde(alias = "action")]
    NextAction,
    /// Nothing actionable was found; still committed if a reviewer approves.
    NonActionable,
}

/// Keyword stems that add a topical tag when found in the task text.
const TOPICAL_TAGS: [(&str, &str); 3] = [
    ("terveys", "#terveys"),
    ("vero", "#vero"),
    ("joulu", "#joulu"),
];

/// Tag marking next actions in the task manager.
const NEXT_ACTION_TAG: &str = "#na";

/// Structured output of a successful clarification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Clarification {
    kind: ClarificationKind,
    title: String,
    #[serde(default)]
    project_name: Option<String>,
    #[serde(default)]
    project_shortname: Option<String>,
    #[serde(default)]
    next_action: Option<String>,
    #[serde(default)]
    context: Option<String>,
    #[serde(default)]
    due_date: Option<NaiveDate>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    notes: Option<String>,
}

/// A rendered task ready to be sent to the task manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskEntry {
    /// Plain task name.
    pub name: String,
    /// Smart-add string: name, tags and an optional `^due` date.
    pub smart_add: String,
}

impl Clarification {
    /// Creates a clarification with the required classification and title.
    ///
    /// # Errors
    ///
    /// Returns [`CaptureDomainError::EmptyTitle`] when the title is blank.
    pub fn new(kind: ClarificationKind, title: impl Into<String>) -> Result<Self, CaptureDomainError> {
        let raw = title.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(CaptureDomainError::EmptyTitle);
        }
        Ok(Self {
            kind,
            title: trimmed.to_owned(),
            project_name: None,
            project_shortname: None,
            next_action: None,
            context: None,
            due_date: None,
            tags: Vec::new(),
            notes: None,
        })
    }

    /// Sets the project name.
    #[must_use]
    pub fn with_project_name(mut self, name: impl Into<String>) -> Self {
        self.project_name = non_blank(name.into());
        self
    }

    /// Sets the project shortname, normalized to upper case.
    #[must_use]
    pub fn with_project_shortname(mut self, shortname: impl Into<String>) -> Self {
        self.project_shortname = non_blank(shortname.into()).map(|value| value.to_uppercase());
        self
    }

    /// Sets the concrete next action text.
    #[must_use]
    pub fn with_next_action(mut self, next_action: impl Into<String>) -> Self {
        self.next_action = non_blank(next_action.into());
        self
    }

    /// Sets the suggested context (for example `@koti`).
    #[must_use]
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = non_blank(context.into());
        self
    }

    /// Sets the due date.
    #[must_use]
    pub const fn with_due_date(mut self, due_date: NaiveDate) -> Self {
        self.due_date = Some(due_date);
        self
    }

    /// Sets the clarifier-suggested tags.
    #[must_use]
    pub fn with_tags(mut self, tags: impl IntoIterator<Item = String>) -> Self {
        self.tags = tags.into_iter().filter_map(non_blank).collect();
        self
    }

    /// Sets free-form notes.
    #[must_use]
    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = non_blank(notes.into());
        self
    }

    /// Returns the classification.
    #[must_use]
    pub const fn kind(&self) -> ClarificationKind {
        self.kind
    }

    /// Returns the normalized title.
    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Returns the project name, if any.
    #[must_use]
    pub fn project_name(&self) -> Option<&str> {
        self.project_name.as_deref()
    }

    /// Returns the project shortname, if any.
    #[must_use]
    pub fn project_shortname(&self) -> Option<&str> {
        self.project_shortname.as_deref()
    }

    /// Returns the next action text, if any.
    #[must_use]
    pub fn next_action(&self) -> Option<&str> {
        self.next_action.as_deref()
    }

    /// Returns the suggested context, if any.
    #[must_use]
    pub fn context(&self) -> Option<&str> {
        self.context.as_deref()
    }

    /// Returns the due date, if any.
    #[must_use]
    pub const fn due_date(&self) -> Option<NaiveDate> {
        self.due_date
    }

    /// Returns the clarifier-suggested tags.
    #[must_use]
    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    /// Returns the notes, if any.
    #[must_use]
    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    /// Renders the task-manager entry for this clarification.
    ///
    /// Projects become `"<SHORTNAME> - §§§ - <name>"` without the next-action
    /// tag; everything else is named after its next action and tagged `#na`.
    ///
    /// # Errors
    ///
    /// Returns [`CaptureDomainError::MissingProjectShortname`] for a project
    /// without a shortname.
    pub fn task_entry(&self, capture_id: CaptureId) -> Result<TaskEntry, CaptureDomainError> {
        let (name, include_next_action_tag) = match self.kind {
            ClarificationKind::Project => {
                let shortname = self
                    .project_shortname
                    .as_deref()
                    .ok_or(CaptureDomainError::MissingProjectShortname(capture_id))?;
                let base = self
                    .project_name
                    .as_deref()
                    .or(self.next_action.as_deref())
                    .unwrap_or(&self.title);
                (format!("{shortname} - §§§ - {base}"), false)
            }
            ClarificationKind::NextAction | ClarificationKind::NonActionable => (
                self.next_action
                    .clone()
                    .unwrap_or_else(|| self.title.clone()),
                true,
            ),
        };

        let tags = self.collect_tags(&name, include_next_action_tag);
        let mut smart_add = name.clone();
        if !tags.is_empty() {
            smart_add.push(' ');
            smart_add.push_str(&tags.join(" "));
        }
        if let Some(due_date) = self.due_date {
            smart_add.push_str(&format!(" ^{}", due_date.format("%Y-%m-%d")));
        }

        Ok(TaskEntry { name, smart_add })
    }

    fn collect_tags(&self, name: &str, include_next_action_tag: bool) -> Vec<String> {
        let haystack = [
            Some(name),
            Some(self.title.as_str()),
            self.project_name.as_deref(),
            self.next_action.as_deref(),
        ]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();

        let mut tags: Vec<String> = Vec::new();
        let mut push = |tag: String| {
            if !tags.contains(&tag) {
                tags.push(tag);
            }
        };

        if include_next_action_tag {
            push(NEXT_ACTION_TAG.to_owned());
        }
        for (stem, tag) in TOPICAL_TAGS {
            if haystack.contains(stem) {
                push(tag.to_owned());
            }
        }
        for tag in &self.tags {
            let normalized = if tag.starts_with('#') {
                tag.to_lowercase()
            } else {
                format!("#{}", tag.to_lowercase())
            };
            push(normalized);
        }
        tags
    }
}

fn non_blank(value: String) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_owned())
}
