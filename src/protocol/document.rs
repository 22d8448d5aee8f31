//! Document payloads exchanged over the socket.
//!
//! Field names follow the dashboard's JSON (`camelCase`). Optional
//! fields are omitted when absent.

// ============================================================================
// Imports
// ============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::identifiers::DocumentId;

// ============================================================================
// Document
// ============================================================================

/// A shared document as broadcast between dashboard clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: DocumentId,
    pub name: String,
    pub views: u64,
    pub status: DocumentStatus,
    pub created_at: DateTime<Utc>,
    pub allow_download: bool,
    pub version: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_viewed: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_viewed_location: Option<String>,

    #[serde(default)]
    pub sharing: Sharing,
    #[serde(default)]
    pub protection: Protection,
    #[serde(default)]
    pub analytics: Analytics,
    #[serde(default)]
    pub qa: QaSettings,
    #[serde(default)]
    pub audit: AuditLog,
}

impl Document {
    /// Creates a freshly uploaded document: active, private, version 1.
    #[must_use]
    pub fn new(id: impl Into<DocumentId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            views: 0,
            status: DocumentStatus::Active,
            created_at: Utc::now(),
            allow_download: true,
            version: 1,
            last_viewed: None,
            last_viewed_location: None,
            sharing: Sharing::default(),
            protection: Protection::default(),
            analytics: Analytics::default(),
            qa: QaSettings::default(),
            audit: AuditLog::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    #[default]
    Active,
    Archived,
}

// ============================================================================
// Sharing & Protection
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SharingType {
    #[default]
    Private,
    Restricted,
    Public,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sharing {
    #[serde(rename = "type")]
    pub sharing_type: SharingType,
    #[serde(default)]
    pub allowed_users: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_domains: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Protection {
    pub watermark: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub watermark_text: Option<String>,
    pub screenshot: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_limit: Option<u32>,
    pub password_protected: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

// ============================================================================
// Analytics
// ============================================================================

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Analytics {
    pub total_views: u64,
    pub unique_views: u64,
    /// Seconds.
    pub average_time_spent: f64,
    #[serde(default)]
    pub locations: Vec<LocationViews>,
    #[serde(default)]
    pub devices: Vec<DeviceCount>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationViews {
    pub country: String,
    pub views: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceCount {
    #[serde(rename = "type")]
    pub device_type: String,
    pub count: u64,
}

// ============================================================================
// Q&A and Audit
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct QaSettings {
    pub enabled: bool,
    #[serde(default)]
    pub items: Vec<QaItem>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QaItem {
    pub id: String,
    pub question: String,
    pub answer: String,
    pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AuditLog {
    #[serde(default)]
    pub events: Vec<AuditEvent>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub user: String,
    pub timestamp: String,
    pub details: String,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_dashboard_document() {
        let json_str = r#"{
            "id": "1",
            "name": "Project Proposal",
            "views": 120,
            "status": "active",
            "createdAt": "2023-01-15T00:00:00.000Z",
            "allowDownload": true,
            "version": 1,
            "sharing": {
                "type": "restricted",
                "allowedUsers": ["john@example.com", "jane@example.com"]
            },
            "protection": {
                "watermark": true,
                "watermarkText": "Confidential",
                "screenshot": false,
                "passwordProtected": true,
                "password": "securepass"
            },
            "analytics": {
                "totalViews": 120,
                "uniqueViews": 85,
                "averageTimeSpent": 300,
                "locations": [{ "country": "USA", "views": 50 }],
                "devices": [{ "type": "Desktop", "count": 70 }]
            },
            "qa": { "enabled": true, "items": [] },
            "audit": { "events": [] }
        }"#;

        let doc: Document = serde_json::from_str(json_str).expect("parse document");
        assert_eq!(doc.id.as_str(), "1");
        assert_eq!(doc.sharing.sharing_type, SharingType::Restricted);
        assert_eq!(doc.sharing.allowed_users.len(), 2);
        assert_eq!(doc.protection.watermark_text.as_deref(), Some("Confidential"));
        assert_eq!(doc.analytics.devices[0].device_type, "Desktop");
        assert!(doc.qa.enabled);
    }

    #[test]
    fn test_new_document_defaults() {
        let doc = Document::new("9", "Quarterly Report.pdf");
        assert_eq!(doc.status, DocumentStatus::Active);
        assert_eq!(doc.sharing.sharing_type, SharingType::Private);
        assert_eq!(doc.version, 1);
        assert!(!doc.protection.password_protected);
    }

    #[test]
    fn test_serialize_uses_camel_case_and_skips_none() {
        let doc = Document::new("9", "notes.txt");
        let json = serde_json::to_value(&doc).expect("serialize");

        assert!(json.get("createdAt").is_some());
        assert!(json.get("allowDownload").is_some());
        assert!(json.get("lastViewed").is_none());
        assert_eq!(json["sharing"]["type"], "private");
        assert!(json["protection"].get("watermarkText").is_none());
    }
}
