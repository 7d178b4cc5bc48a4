use crate::error::ApiError;

pub const DEFAULT_LIMIT: i64 = 50;
const MAX_LIMIT: i64 = 200;
const MAX_OFFSET: i64 = 10_000;

pub fn validate_pagination(limit: i64, offset: i64) -> Result<(i64, i64), ApiError> {
    if !(1..=MAX_LIMIT).contains(&limit) {
        return Err(ApiError::BadRequest(format!(
            "limit must be between 1 and {MAX_LIMIT}"
        )));
    }

    if !(0..=MAX_OFFSET).contains(&offset) {
        return Err(ApiError::BadRequest(format!(
            "offset must be between 0 and {MAX_OFFSET}"
        )));
    }

    Ok((limit, offset))
}

/// Pull `limit`/`offset` out of raw query pairs. The last occurrence wins.
pub fn pagination_from_pairs(pairs: &[(String, String)]) -> Result<(i64, i64), ApiError> {
    let read = |name: &str, default: i64| -> Result<i64, ApiError> {
        match pairs.iter().rev().find(|(key, _)| key == name) {
            None => Ok(default),
            Some((_, raw)) => raw
                .trim()
                .parse::<i64>()
                .map_err(|_| ApiError::BadRequest(format!("{name} must be an integer"))),
        }
    };

    validate_pagination(read("limit", DEFAULT_LIMIT)?, read("offset", 0)?)
}
