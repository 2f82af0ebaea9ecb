//! OData OrderBy building
//!
//! Sort keys are kept in the order they were added; the list renders as
//! `name dir` entries joined by a bare comma.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

impl SortDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            SortDirection::Ascending => "asc",
            SortDirection::Descending => "desc",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    name: String,
    direction: SortDirection,
}

impl SortKey {
    pub fn asc(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            direction: SortDirection::Ascending,
        }
    }

    pub fn desc(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            direction: SortDirection::Descending,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn direction(&self) -> SortDirection {
        self.direction
    }

    /// Convert to OData orderby string
    pub fn to_odata_string(&self) -> String {
        format!("{} {}", self.name, self.direction.as_str())
    }
}

/// Render an ordered list of keys, `None` when there is nothing to sort by.
pub fn orderby_string(keys: &[SortKey]) -> Option<String> {
    if keys.is_empty() {
        return None;
    }
    Some(keys.iter().map(SortKey::to_odata_string).collect::<Vec<_>>().join(","))
}
