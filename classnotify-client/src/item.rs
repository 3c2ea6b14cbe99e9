use std::fmt;

use chrono::{DateTime, Utc};
use classnotify_shared::api::{AnnouncementDto, CourseWorkDto};
use classnotify_shared::domain::{CourseId, ItemId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemKind {
    Announcement,
    Assignment,
}

impl ItemKind {
    pub fn label(&self) -> &'static str {
        match self {
            ItemKind::Announcement => "Announcement",
            ItemKind::Assignment => "Assignment",
        }
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A candidate update fetched during one poll cycle. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateItem {
    Announcement {
        course_id: CourseId,
        id: ItemId,
        text: String,
        modified_at: DateTime<Utc>,
    },
    Assignment {
        course_id: CourseId,
        id: ItemId,
        title: String,
        modified_at: DateTime<Utc>,
    },
}

/// Identity of one version of an item: the same item edited later is a new key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ItemKey {
    pub kind: ItemKind,
    pub id: ItemId,
    pub modified_at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ItemParseError {
    #[error("{kind} {id}: missing updateTime")]
    MissingTimestamp { kind: ItemKind, id: String },
    #[error("{kind} {id}: invalid updateTime {raw:?}: {reason}")]
    InvalidTimestamp {
        kind: ItemKind,
        id: String,
        raw: String,
        reason: String,
    },
}

/// Parses an RFC3339 timestamp into an absolute UTC instant.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(raw.trim()).map(|dt| dt.with_timezone(&Utc))
}

fn parse_update_time(
    kind: ItemKind,
    id: &str,
    raw: Option<&str>,
) -> Result<DateTime<Utc>, ItemParseError> {
    let raw = raw.ok_or_else(|| ItemParseError::MissingTimestamp {
        kind,
        id: id.to_string(),
    })?;
    parse_timestamp(raw).map_err(|e| ItemParseError::InvalidTimestamp {
        kind,
        id: id.to_string(),
        raw: raw.to_string(),
        reason: e.to_string(),
    })
}

impl UpdateItem {
    pub fn from_announcement(
        course_id: CourseId,
        dto: AnnouncementDto,
    ) -> Result<Self, ItemParseError> {
        let modified_at =
            parse_update_time(ItemKind::Announcement, &dto.id, dto.update_time.as_deref())?;
        Ok(UpdateItem::Announcement {
            course_id,
            id: ItemId(dto.id),
            text: dto.text,
            modified_at,
        })
    }

    pub fn from_course_work(
        course_id: CourseId,
        dto: CourseWorkDto,
    ) -> Result<Self, ItemParseError> {
        let modified_at =
            parse_update_time(ItemKind::Assignment, &dto.id, dto.update_time.as_deref())?;
        Ok(UpdateItem::Assignment {
            course_id,
            id: ItemId(dto.id),
            title: dto.title,
            modified_at,
        })
    }

    pub fn kind(&self) -> ItemKind {
        match self {
            UpdateItem::Announcement { .. } => ItemKind::Announcement,
            UpdateItem::Assignment { .. } => ItemKind::Assignment,
        }
    }

    pub fn course_id(&self) -> &CourseId {
        match self {
            UpdateItem::Announcement { course_id, .. } | UpdateItem::Assignment { course_id, .. } => {
                course_id
            }
        }
    }

    pub fn id(&self) -> &ItemId {
        match self {
            UpdateItem::Announcement { id, .. } | UpdateItem::Assignment { id, .. } => id,
        }
    }

    /// Announcement text or assignment title.
    pub fn content(&self) -> &str {
        match self {
            UpdateItem::Announcement { text, .. } => text,
            UpdateItem::Assignment { title, .. } => title,
        }
    }

    pub fn modified_at(&self) -> DateTime<Utc> {
        match self {
            UpdateItem::Announcement { modified_at, .. }
            | UpdateItem::Assignment { modified_at, .. } => *modified_at,
        }
    }

    pub fn key(&self) -> ItemKey {
        ItemKey {
            kind: self.kind(),
            id: self.id().clone(),
            modified_at: self.modified_at(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn announcement(update_time: Option<&str>) -> AnnouncementDto {
        AnnouncementDto {
            id: "a1".into(),
            course_id: "c1".into(),
            text: "Quiz Friday".into(),
            update_time: update_time.map(str::to_string),
            alternate_link: None,
        }
    }

    #[test]
    fn offsets_are_normalized_to_utc() {
        let a = parse_timestamp("2024-03-10T12:00:00+02:00").unwrap();
        let b = parse_timestamp("2024-03-10T10:00:00Z").unwrap();
        assert_eq!(a, b);
        assert_eq!(a, Utc.with_ymd_and_hms(2024, 3, 10, 10, 0, 0).unwrap());
    }

    #[test]
    fn fractional_seconds_are_kept() {
        let t = parse_timestamp("2024-03-10T10:00:00.000000001Z").unwrap();
        assert_eq!(t.timestamp_subsec_nanos(), 1);
    }

    #[test]
    fn announcement_conversion() {
        let item =
            UpdateItem::from_announcement("c1".into(), announcement(Some("2024-03-10T10:00:00Z")))
                .unwrap();
        assert_eq!(item.kind(), ItemKind::Announcement);
        assert_eq!(item.content(), "Quiz Friday");
        assert_eq!(item.course_id().as_str(), "c1");
    }

    #[test]
    fn bad_or_missing_timestamp_fails_the_item() {
        let err = UpdateItem::from_announcement("c1".into(), announcement(None)).unwrap_err();
        assert!(matches!(err, ItemParseError::MissingTimestamp { .. }));

        let err = UpdateItem::from_announcement("c1".into(), announcement(Some("yesterday")))
            .unwrap_err();
        assert!(matches!(err, ItemParseError::InvalidTimestamp { .. }));
    }
}
