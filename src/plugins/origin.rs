//! Origin allow-list: `source` is a comma-separated list of acceptable
//! `Origin` header values, compared case-insensitively.

use super::{InvalidOriginError, OriginValidator};
use async_trait::async_trait;

pub struct AllowListOrigin {
    allowed: Vec<String>,
}

impl AllowListOrigin {
    pub fn new(source: &str) -> Self {
        AllowListOrigin {
            allowed: source.split(',').map(|s| s.trim().to_string()).collect(),
        }
    }
}

#[async_trait]
impl OriginValidator for AllowListOrigin {
    async fn validate(&self, origin: Option<&str>) -> Result<(), InvalidOriginError> {
        let matches = origin
            .map(|o| self.allowed.iter().any(|a| a.eq_ignore_ascii_case(o)))
            .unwrap_or(false);

        if matches {
            Ok(())
        } else {
            Err(InvalidOriginError {
                expected: self.allowed.clone(),
                actual: origin.map(str::to_string),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn accepts_listed_origin_case_insensitively() {
        let validator = AllowListOrigin::new("https://good.example, https://also.example");
        assert!(validator.validate(Some("HTTPS://GOOD.EXAMPLE")).await.is_ok());
    }

    #[tokio::test]
    async fn rejects_unlisted_or_missing_origin() {
        let validator = AllowListOrigin::new("https://good.example");
        assert!(validator.validate(Some("https://evil.example")).await.is_err());
        assert!(validator.validate(None).await.is_err());
    }
}
