use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

/// Lifecycle of a content row. Locally authored rows start out as
/// `pending`/`syncing` and only ever move forward to `synced` or `failed`;
/// rows first seen in a remote batch are stored as `synced` directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentStatus {
    Pending,
    Syncing,
    Synced,
    Failed,
}

impl ContentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentStatus::Pending => "pending",
            ContentStatus::Syncing => "syncing",
            ContentStatus::Synced => "synced",
            ContentStatus::Failed => "failed",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pending" => Some(ContentStatus::Pending),
            "syncing" => Some(ContentStatus::Syncing),
            "synced" => Some(ContentStatus::Synced),
            "failed" => Some(ContentStatus::Failed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Object,
    Comment,
    Like,
}

impl ContentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentKind::Object => "object",
            ContentKind::Comment => "comment",
            ContentKind::Like => "like",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "object" => Some(ContentKind::Object),
            "comment" => Some(ContentKind::Comment),
            "like" => Some(ContentKind::Like),
            _ => None,
        }
    }
}

/// Derived counters cached in the summary table. Every kind can be rebuilt
/// from its base table at any time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SummaryKind {
    PublisherContent,
    ObjectComment,
    ObjectUpVote,
    NotificationUnreadObjectLike,
    NotificationUnreadCommentLike,
    NotificationUnreadCommentObject,
    NotificationUnreadCommentReply,
}

impl SummaryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SummaryKind::PublisherContent => "publisherContent",
            SummaryKind::ObjectComment => "objectComment",
            SummaryKind::ObjectUpVote => "objectUpVote",
            SummaryKind::NotificationUnreadObjectLike => "notificationUnreadObjectLike",
            SummaryKind::NotificationUnreadCommentLike => "notificationUnreadCommentLike",
            SummaryKind::NotificationUnreadCommentObject => "notificationUnreadCommentObject",
            SummaryKind::NotificationUnreadCommentReply => "notificationUnreadCommentReply",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "publisherContent" => Some(SummaryKind::PublisherContent),
            "objectComment" => Some(SummaryKind::ObjectComment),
            "objectUpVote" => Some(SummaryKind::ObjectUpVote),
            "notificationUnreadObjectLike" => Some(SummaryKind::NotificationUnreadObjectLike),
            "notificationUnreadCommentLike" => Some(SummaryKind::NotificationUnreadCommentLike),
            "notificationUnreadCommentObject" => Some(SummaryKind::NotificationUnreadCommentObject),
            "notificationUnreadCommentReply" => Some(SummaryKind::NotificationUnreadCommentReply),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NotificationType {
    ObjectLike,
    CommentLike,
    CommentObject,
    CommentReply,
}

impl NotificationType {
    pub const ALL: [NotificationType; 4] = [
        NotificationType::ObjectLike,
        NotificationType::CommentLike,
        NotificationType::CommentObject,
        NotificationType::CommentReply,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationType::ObjectLike => "objectLike",
            NotificationType::CommentLike => "commentLike",
            NotificationType::CommentObject => "commentObject",
            NotificationType::CommentReply => "commentReply",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "objectLike" => Some(NotificationType::ObjectLike),
            "commentLike" => Some(NotificationType::CommentLike),
            "commentObject" => Some(NotificationType::CommentObject),
            "commentReply" => Some(NotificationType::CommentReply),
            _ => None,
        }
    }

    /// The unread counter maintained for this notification type.
    pub fn unread_summary_kind(&self) -> SummaryKind {
        match self {
            NotificationType::ObjectLike => SummaryKind::NotificationUnreadObjectLike,
            NotificationType::CommentLike => SummaryKind::NotificationUnreadCommentLike,
            NotificationType::CommentObject => SummaryKind::NotificationUnreadCommentObject,
            NotificationType::CommentReply => SummaryKind::NotificationUnreadCommentReply,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationStatus {
    Unread,
    Read,
}

impl NotificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationStatus::Unread => "unread",
            NotificationStatus::Read => "read",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "unread" => Some(NotificationStatus::Unread),
            "read" => Some(NotificationStatus::Read),
            _ => None,
        }
    }
}

macro_rules! text_enum_sql {
    ($ty:ty) => {
        impl ToSql for $ty {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(self.as_str().into())
            }
        }

        impl FromSql for $ty {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                let raw = value.as_str()?;
                Self::parse(raw).ok_or_else(|| {
                    FromSqlError::Other(
                        format!("unrecognized {} value: {raw}", stringify!($ty)).into(),
                    )
                })
            }
        }
    };
}

text_enum_sql!(ContentStatus);
text_enum_sql!(ContentKind);
text_enum_sql!(SummaryKind);
text_enum_sql!(NotificationType);
text_enum_sql!(NotificationStatus);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentRecord {
    /// Storage-assigned row id; `None` until the row is inserted.
    pub id: Option<i64>,
    /// Globally unique transaction id assigned by the author's signing step.
    pub trx_id: String,
    pub group_id: String,
    /// Author key. Absent until the item has been confirmed remotely.
    pub publisher: Option<String>,
    pub kind: ContentKind,
    pub timestamp: i64,
    pub body: String,
    /// For comments and likes, the object they target.
    pub object_trx_id: Option<String>,
    /// For nested comments, the top-level comment of the thread.
    pub thread_trx_id: Option<String>,
    /// For replies, the comment being replied to.
    pub reply_trx_id: Option<String>,
    pub status: ContentStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileRecord {
    pub id: Option<i64>,
    /// Empty string marks the cross-group default submission.
    pub group_id: String,
    pub publisher: String,
    pub name: String,
    pub avatar: String,
    pub external_account_id: Option<String>,
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryRecord {
    pub group_id: String,
    pub object_id: String,
    pub object_type: SummaryKind,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub id: String,
    pub group_id: String,
    /// Trx id of the item the notification points at: the liked object or
    /// comment, or the newly arrived comment itself.
    pub object_trx_id: String,
    pub kind: NotificationType,
    pub status: NotificationStatus,
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncCursorRecord {
    pub group_id: String,
    pub latest_read_timestamp: i64,
    pub unread_count: i64,
    pub latest_object_timestamp: i64,
}

#[derive(Debug, Clone, Default)]
pub struct ContentQuery {
    pub group_id: String,
    pub kind: Option<ContentKind>,
    pub publisher: Option<String>,
    pub before_timestamp: Option<i64>,
    pub limit: usize,
}
