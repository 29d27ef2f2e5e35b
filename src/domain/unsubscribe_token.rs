use chrono::{DateTime, Duration, Utc};
use rand::Rng;

const TOKEN_LENGTH: usize = 64;
const TOKEN_TTL_DAYS: i64 = 7;

/// Single-use credential embedded in every comic email. Each delivery run issues a new one,
/// replacing whatever token the subscriber had before.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsubscribeToken {
    value: String,
    expires_at: DateTime<Utc>,
}

impl UnsubscribeToken {
    pub fn generate(issued_at: DateTime<Utc>) -> UnsubscribeToken {
        let mut rng = rand::thread_rng();
        let value = std::iter::repeat_with(|| rng.sample(rand::distributions::Alphanumeric))
            .map(char::from)
            .take(TOKEN_LENGTH)
            .collect();

        Self {
            value,
            expires_at: issued_at + Duration::days(TOKEN_TTL_DAYS),
        }
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }
}

impl AsRef<str> for UnsubscribeToken {
    fn as_ref(&self) -> &str {
        &self.value
    }
}
