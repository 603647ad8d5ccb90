//! # Portal Types
//!
//! Payloads for the tenant portal's other authenticated endpoints.

use serde::{Deserialize, Serialize};

/// Tenant profile as returned by `GET /profile/`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TenantProfile {
    #[serde(default)]
    pub id: Option<u64>,
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub unit_number: Option<String>,
    #[serde(default)]
    pub phone_number: Option<String>,
}

impl TenantProfile {
    pub fn display_name(&self) -> String {
        match (self.first_name.as_deref(), self.last_name.as_deref()) {
            (Some(f), Some(l)) if !f.is_empty() && !l.is_empty() => format!("{} {}", f, l),
            (Some(f), _) if !f.is_empty() => f.to_string(),
            _ => self.username.clone(),
        }
    }
}

/// Partial profile update for `PATCH /profile/`. Unset fields are left alone.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
}

/// Counters for the dashboard header
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DashboardCounts {
    pub username: String,
    #[serde(default)]
    pub open_complaints: u32,
    #[serde(default)]
    pub unread_notifications: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Urgency {
    Low,
    #[default]
    Medium,
    High,
}

/// Body of `POST /requests/`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MaintenanceRequest {
    pub request_subject: String,
    pub urgency: Urgency,
    pub description: String,
}

/// Body of `POST /complaints/`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Complaint {
    /// Category code, e.g. `plumbing`
    #[serde(rename = "type")]
    pub kind: String,
    /// Human-readable category, e.g. `Plumbing / Leaks`
    pub subject: String,
    pub description: String,
}
