use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::directory::{DepartmentId, NatureTypeId, UserId};

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ComplaintId(pub String);

impl std::fmt::Display for ComplaintId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplaintStatus {
    New,
    Assigned,
    InProgress,
    Completed,
    Done,
    Closed,
}

impl ComplaintStatus {
    pub const ALL: [ComplaintStatus; 6] = [
        Self::New,
        Self::Assigned,
        Self::InProgress,
        Self::Completed,
        Self::Done,
        Self::Closed,
    ];

    /// The only status `advance` may move to from `self`.
    pub fn successor(self) -> Option<Self> {
        match self {
            Self::New => Some(Self::Assigned),
            Self::Assigned => Some(Self::InProgress),
            Self::InProgress => Some(Self::Completed),
            Self::Completed => Some(Self::Done),
            Self::Done => Some(Self::Closed),
            Self::Closed => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        self == Self::Closed
    }

    pub fn is_open(self) -> bool {
        !matches!(self, Self::Done | Self::Closed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Assigned => "assigned",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Done => "done",
            Self::Closed => "closed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().replace([' ', '-'], "_").as_str() {
            "new" => Some(Self::New),
            "assigned" => Some(Self::Assigned),
            "in_progress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            "done" => Some(Self::Done),
            "closed" => Some(Self::Closed),
            _ => None,
        }
    }
}

impl std::fmt::Display for ComplaintStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metadata for a file held by the attachment store; the bytes never pass through here.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub url: String,
    pub file_name: String,
    pub content_type: Option<String>,
    pub size_bytes: Option<u64>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Complaint {
    pub id: ComplaintId,
    pub client_id: UserId,
    pub title: String,
    pub description: String,
    pub error_type: Option<String>,
    pub error_screen: Option<String>,
    pub nature_type_id: NatureTypeId,
    pub remark: Option<String>,
    pub status: ComplaintStatus,
    pub department_id: DepartmentId,
    pub current_assignee_id: UserId,
    pub first_assignee_id: UserId,
    /// Department was picked by auto-routing rather than by the client.
    #[serde(default)]
    pub auto_routed: bool,
    pub attachments: Vec<Attachment>,
    /// Bumped on every committed transition; used for optimistic concurrency.
    pub version: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Caller-supplied fields for a new complaint.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewComplaint {
    pub title: String,
    pub description: String,
    pub error_type: Option<String>,
    pub error_screen: Option<String>,
    pub nature_type_id: Option<NatureTypeId>,
    pub remark: Option<String>,
    pub department_id: Option<DepartmentId>,
    pub attachments: Vec<Attachment>,
}

impl NewComplaint {
    pub fn missing_required_fields(&self) -> Vec<String> {
        let mut missing = Vec::new();
        if self.title.trim().is_empty() {
            missing.push("title".to_owned());
        }
        if self.description.trim().is_empty() {
            missing.push("description".to_owned());
        }
        if self.nature_type_id.as_ref().map_or(true, |id| id.0.trim().is_empty()) {
            missing.push("nature_type_id".to_owned());
        }
        for (index, attachment) in self.attachments.iter().enumerate() {
            if attachment.url.trim().is_empty() {
                missing.push(format!("attachments[{index}].url"));
            }
        }
        missing
    }
}

#[cfg(test)]
mod tests {
    use super::{ComplaintStatus, NewComplaint};
    use crate::domain::directory::NatureTypeId;

    #[test]
    fn successor_chain_is_linear_and_ends_at_closed() {
        let mut status = ComplaintStatus::New;
        let mut visited = vec![status];
        while let Some(next) = status.successor() {
            visited.push(next);
            status = next;
        }

        assert_eq!(visited, ComplaintStatus::ALL.to_vec());
        assert!(status.is_terminal());
    }

    #[test]
    fn status_parse_accepts_display_spellings() {
        assert_eq!(ComplaintStatus::parse("In Progress"), Some(ComplaintStatus::InProgress));
        assert_eq!(ComplaintStatus::parse("in-progress"), Some(ComplaintStatus::InProgress));
        assert_eq!(ComplaintStatus::parse("CLOSED"), Some(ComplaintStatus::Closed));
        assert_eq!(ComplaintStatus::parse("reopened"), None);
    }

    #[test]
    fn missing_fields_are_reported_by_name() {
        let fields = NewComplaint {
            title: "  ".to_owned(),
            description: "printer jams".to_owned(),
            nature_type_id: Some(NatureTypeId(String::new())),
            ..NewComplaint::default()
        };

        assert_eq!(fields.missing_required_fields(), vec!["title", "nature_type_id"]);
    }
}
