//! Data access and business rules behind the route handlers.

pub mod admins;
pub mod diseases;
pub mod farmers;
pub mod images;
pub mod predictions;
pub mod users;

use serde::Deserialize;

/// `SELECT` list for [`crate::models::UserRow`] with the `u.` table alias.
pub(crate) const USER_COLUMNS_U: &str = "u.id, u.email, u.password_hash, u.name, u.phone, u.address, u.photo, \
     u.role, u.is_active, u.is_deleted, u.need_password_change, u.last_login_at, u.created_at, u.updated_at";

/// Wraps `term` for a `LIKE ... ESCAPE '\'` match, escaping wildcards in the input.
pub(crate) fn like_pattern(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len() + 2);
    escaped.push('%');
    for c in term.trim().chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

/// `search` is only applied when it has non-blank content.
pub(crate) fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    /// Anything other than `asc` (case-insensitive) sorts descending.
    pub fn parse(value: Option<&str>) -> Self {
        match value {
            Some(v) if v.eq_ignore_ascii_case("asc") => SortOrder::Asc,
            _ => SortOrder::Desc,
        }
    }

    pub fn as_sql(self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

/// Query string shared by the admin and farmer directory listings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberListQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub search: Option<String>,
    pub is_active: Option<bool>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
    pub crop_type: Option<String>,
}

/// Resolves `sortBy` against an allow-list of `(wire name, column)` pairs.
///
/// Unknown or missing names sort by `u.created_at DESC` regardless of `sortOrder`.
pub(crate) fn resolve_sort(
    allowed: &[(&str, &'static str)],
    sort_by: Option<&str>,
    sort_order: Option<&str>,
) -> (&'static str, SortOrder) {
    sort_by
        .and_then(|name| allowed.iter().find(|(wire, _)| *wire == name))
        .map(|(_, column)| (*column, SortOrder::parse(sort_order)))
        .unwrap_or(("u.created_at", SortOrder::Desc))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("rice"), "%rice%");
        assert_eq!(like_pattern(" 50%_off "), "%50\\%\\_off%");
    }

    #[test]
    fn test_resolve_sort() {
        let allowed = [("name", "u.name"), ("department", "p.department")];
        assert_eq!(resolve_sort(&allowed, Some("name"), Some("asc")), ("u.name", SortOrder::Asc));
        assert_eq!(resolve_sort(&allowed, Some("department"), None), ("p.department", SortOrder::Desc));
        assert_eq!(resolve_sort(&allowed, Some("password"), Some("asc")), ("u.created_at", SortOrder::Desc));
        assert_eq!(resolve_sort(&allowed, None, None), ("u.created_at", SortOrder::Desc));
    }

    #[test]
    fn test_non_blank() {
        assert_eq!(non_blank(Some("  x ")), Some("x"));
        assert_eq!(non_blank(Some("   ")), None);
        assert_eq!(non_blank(None), None);
    }
}
