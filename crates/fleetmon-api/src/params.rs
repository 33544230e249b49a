use crate::errors::ApiError;
use std::collections::BTreeMap;

pub const DEFAULT_LIST_LIMIT: usize = 100;
pub const MAX_LIST_LIMIT: usize = 1000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListParams {
    pub limit: usize,
    pub include_deleted: bool,
}

/// Query-string parsing for the tenant collection listings. Unknown keys
/// are ignored; malformed values are rejected. The limit bounds come from
/// the caller's configuration; the consts above are the stock values.
pub fn parse_list_params(
    query: &BTreeMap<String, String>,
    default_limit: usize,
    max_limit: usize,
) -> Result<ListParams, ApiError> {
    let limit = if let Some(raw) = query.get("limit") {
        let value = raw
            .parse::<usize>()
            .map_err(|_| ApiError::invalid_param("limit", raw))?;
        if value == 0 || value > max_limit {
            return Err(ApiError::invalid_param("limit", raw));
        }
        value
    } else {
        default_limit
    };

    let include_deleted = match query.get("include_deleted") {
        None => false,
        Some(raw) if raw == "1" || raw.eq_ignore_ascii_case("true") => true,
        Some(raw) if raw == "0" || raw.eq_ignore_ascii_case("false") => false,
        Some(raw) => return Err(ApiError::invalid_param("include_deleted", raw)),
    };

    Ok(ListParams {
        limit,
        include_deleted,
    })
}
