//! Listing parameters and paged results.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::pagination::{DEFAULT_LIMIT, DEFAULT_PAGE, MAX_LIMIT};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// Columns a message listing may be sorted by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MessageSortField {
    #[default]
    CreatedAt,
    UpdatedAt,
    Id,
    Status,
}

impl MessageSortField {
    pub fn column(&self) -> &'static str {
        match self {
            Self::CreatedAt => "created_at",
            Self::UpdatedAt => "updated_at",
            Self::Id => "id",
            Self::Status => "status",
        }
    }
}

/// Tenant-scoped message listing request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessageListQuery {
    pub tenant_id: i64,
    /// Case-insensitive substring match on the message text
    pub search: Option<String>,
    /// Restrict to these message UUIDs when non-empty
    pub items: Vec<Uuid>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub sort: MessageSortField,
    pub order: SortOrder,
}

impl MessageListQuery {
    pub fn for_tenant(tenant_id: i64) -> Self {
        Self {
            tenant_id,
            ..Self::default()
        }
    }

    pub fn page(&self) -> u32 {
        match self.page {
            Some(page) if page > 0 => page,
            _ => DEFAULT_PAGE,
        }
    }

    /// Requested page size, capped at the maximum
    pub fn limit(&self) -> u32 {
        match self.limit {
            Some(limit) if limit > 0 => limit.min(MAX_LIMIT),
            _ => DEFAULT_LIMIT,
        }
    }

    pub fn offset(&self) -> i64 {
        i64::from(self.page() - 1) * i64::from(self.limit())
    }

    /// Search pattern with LIKE wildcards escaped
    pub fn search_pattern(&self) -> Option<String> {
        self.search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| {
                let escaped = s
                    .replace('\\', "\\\\")
                    .replace('%', "\\%")
                    .replace('_', "\\_");
                format!("%{escaped}%")
            })
    }
}

/// One page of results plus the total number of matching rows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: u32,
    pub limit: u32,
}

impl<T> Page<T> {
    pub fn pages(&self) -> i64 {
        if self.total == 0 {
            return 0;
        }
        let limit = i64::from(self.limit);
        (self.total + limit - 1) / limit
    }
}
