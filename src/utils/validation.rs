use crate::utils::error::{RefreshError, Result};
use url::Url;

pub trait Validate {
    fn validate(&self) -> Result<()>;
}

pub fn validate_url(field_name: &str, url_str: &str) -> Result<()> {
    if url_str.is_empty() {
        return Err(RefreshError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: url_str.to_string(),
            reason: "URL cannot be empty".to_string(),
        });
    }

    match Url::parse(url_str) {
        Ok(url) => match url.scheme() {
            "http" | "https" => Ok(()),
            scheme => Err(RefreshError::InvalidConfigValueError {
                field: field_name.to_string(),
                value: url_str.to_string(),
                reason: format!("Unsupported URL scheme: {}", scheme),
            }),
        },
        Err(e) => Err(RefreshError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: url_str.to_string(),
            reason: format!("Invalid URL format: {}", e),
        }),
    }
}

pub fn validate_path(field_name: &str, path: &str) -> Result<()> {
    if path.is_empty() {
        return Err(RefreshError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: path.to_string(),
            reason: "Path cannot be empty".to_string(),
        });
    }

    if path.contains('\0') {
        return Err(RefreshError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: path.to_string(),
            reason: "Path contains null bytes".to_string(),
        });
    }

    Ok(())
}

/// query id 會直接變成匯出目錄名稱，也會出現在 URL path 中
pub fn validate_path_segment(field_name: &str, segment: &str) -> Result<()> {
    validate_non_empty_string(field_name, segment)?;

    if segment == "." || segment == ".." {
        return Err(RefreshError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: segment.to_string(),
            reason: "Value cannot be a relative path component".to_string(),
        });
    }

    if let Some(bad) = segment
        .chars()
        .find(|c| matches!(c, '/' | '\\' | '?' | '#' | '\0'))
    {
        return Err(RefreshError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: segment.to_string(),
            reason: format!("Value cannot contain '{}'", bad.escape_default()),
        });
    }

    Ok(())
}

pub fn validate_positive_number(field_name: &str, value: u64, min_value: u64) -> Result<()> {
    if value < min_value {
        return Err(RefreshError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: format!("Value must be at least {}", min_value),
        });
    }
    Ok(())
}

pub fn validate_non_empty_string(field_name: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(RefreshError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: "Value cannot be empty or whitespace-only".to_string(),
        });
    }
    Ok(())
}

pub fn validate_range<T: PartialOrd + std::fmt::Display + Copy>(
    field_name: &str,
    value: T,
    min: T,
    max: T,
) -> Result<()> {
    if value < min || value > max {
        return Err(RefreshError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: format!("Value must be between {} and {}", min, max),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use tokio_test::{assert_err, assert_ok};

    #[test]
    fn test_validate_url() {
        assert_ok!(validate_url("redash.base_url", "https://redash.example.com"));
        assert_ok!(validate_url("redash.base_url", "http://localhost:5000"));
        assert_err!(validate_url("redash.base_url", ""));
        assert_err!(validate_url("redash.base_url", "invalid-url"));
        assert_err!(validate_url("redash.base_url", "ftp://example.com"));
    }

    #[test]
    fn test_validate_path_segment() {
        assert!(validate_path_segment("queries.id", "42").is_ok());
        assert!(validate_path_segment("queries.id", "sales-report").is_ok());
        assert!(validate_path_segment("queries.id", "").is_err());
        assert!(validate_path_segment("queries.id", "..").is_err());
        assert!(validate_path_segment("queries.id", "a/b").is_err());
        assert!(validate_path_segment("queries.id", "a?b").is_err());
    }

    #[test]
    fn test_validate_positive_number() {
        assert!(validate_positive_number("polling.max_attempts", 5, 1).is_ok());
        assert!(validate_positive_number("polling.max_attempts", 0, 1).is_err());
    }

    #[test]
    fn test_validate_range() {
        assert!(validate_range("execution.concurrent_jobs", 4, 1, 64).is_ok());
        assert!(validate_range("execution.concurrent_jobs", 65, 1, 64).is_err());
    }
}
