use async_trait::async_trait;
use dashmap::DashMap;
use warden_auth::{AuthResult, OtpDelivery};

/// Development delivery: records that a code went out instead of sending it
/// anywhere. The code itself is never logged.
///
/// A delivery built with [`TracingOtpDelivery::capturing`] also keeps the
/// most recent code per key so tests can complete a flow. The default one
/// keeps nothing.
#[derive(Debug, Default)]
pub struct TracingOtpDelivery {
    last_codes: Option<DashMap<String, String>>,
}

impl TracingOtpDelivery {
    pub fn new() -> Self {
        Self::default()
    }

    /// A delivery that remembers the last code per key.
    pub fn capturing() -> Self {
        Self {
            last_codes: Some(DashMap::new()),
        }
    }

    /// The last code delivered to `key`. Always `None` unless built with
    /// [`capturing`](Self::capturing).
    pub fn last_code(&self, key: &str) -> Option<String> {
        self.last_codes
            .as_ref()?
            .get(key)
            .map(|c| c.value().clone())
    }
}

#[async_trait]
impl OtpDelivery for TracingOtpDelivery {
    async fn deliver(&self, key: &str, code: &str) -> AuthResult<()> {
        if let Some(codes) = &self.last_codes {
            codes.insert(key.to_string(), code.to_string());
        }
        tracing::info!(digits = code.len(), "One-time code delivered");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_default_delivery_keeps_no_codes() {
        let delivery = TracingOtpDelivery::new();
        delivery.deliver("+1555", "123456").await.unwrap();
        assert!(delivery.last_code("+1555").is_none());
    }

    #[tokio::test]
    async fn test_capturing_delivery_keeps_latest_code() {
        let delivery = TracingOtpDelivery::capturing();
        delivery.deliver("+1555", "123456").await.unwrap();
        delivery.deliver("+1555", "654321").await.unwrap();
        assert_eq!(delivery.last_code("+1555").as_deref(), Some("654321"));
    }
}
