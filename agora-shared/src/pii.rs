use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// A wrapper for sensitive data that masks its value in Debug output and can be customized for Serialization.
#[derive(Clone, Deserialize)]
pub struct Masked<T>(pub T);

impl<T: fmt::Display> fmt::Debug for Masked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "********")
    }
}

impl<T: fmt::Display> fmt::Display for Masked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "********")
    }
}

impl<T: Serialize> Serialize for Masked<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        // Masking applies to log macros like tracing::info!("{:?}", event);
        // API responses and outbound notifications still need the real value.
        self.0.serialize(serializer)
    }
}

impl<T> Masked<T> {
    pub fn into_inner(self) -> T {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_output_is_masked() {
        let email = Masked("buyer@acme.example".to_string());
        assert_eq!(format!("{:?}", email), "********");
        assert_eq!(format!("{}", email), "********");
    }

    #[test]
    fn serialization_keeps_inner_value() {
        let email = Masked("buyer@acme.example".to_string());
        let json = serde_json::to_string(&email).unwrap();
        assert_eq!(json, "\"buyer@acme.example\"");
    }
}
