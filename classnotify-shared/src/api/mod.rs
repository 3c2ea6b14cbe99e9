use serde::{Deserialize, Serialize};

pub mod endpoints;
#[cfg(feature = "rest-client")]
pub mod rest;

pub const API_V1_PREFIX: &str = "/v1";
pub const DEFAULT_API_BASE: &str = "https://classroom.googleapis.com";
/// Server-side ordering requested for announcements and coursework.
pub const ORDER_BY_UPDATE_TIME_DESC: &str = "updateTime desc";

// Courses
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseDto {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub section: Option<String>,
    #[serde(default)]
    pub course_state: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListCoursesResp {
    #[serde(default)]
    pub courses: Vec<CourseDto>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

// Announcements
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnouncementDto {
    pub id: String,
    pub course_id: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub update_time: Option<String>, // RFC3339
    #[serde(default)]
    pub alternate_link: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListAnnouncementsResp {
    #[serde(default)]
    pub announcements: Vec<AnnouncementDto>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

// Coursework (assignments)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseWorkDto {
    pub id: String,
    pub course_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub update_time: Option<String>, // RFC3339
    #[serde(default)]
    pub alternate_link: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListCourseWorkResp {
    #[serde(default)]
    pub course_work: Vec<CourseWorkDto>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

// OAuth token endpoint (snake_case on the wire)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResp {
    pub access_token: String,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}
