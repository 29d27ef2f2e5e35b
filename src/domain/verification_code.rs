use rand::Rng;

const CODE_LENGTH: usize = 6;

/// Six digit numeric code mailed to a subscriber to prove ownership of the address, both when
/// verifying a registration and when confirming an unsubscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationCode(String);

impl VerificationCode {
    pub fn generate() -> VerificationCode {
        let mut rng = rand::thread_rng();

        Self(rng.gen_range(100_000..1_000_000).to_string())
    }

    pub fn parse(code: String) -> Result<VerificationCode, String> {
        let is_valid =
            code.chars().count() == CODE_LENGTH && code.chars().all(|char| char.is_ascii_digit());

        if !is_valid {
            return Err(format!("{} is not a valid verification code", code));
        }

        Ok(Self(code))
    }
}

impl AsRef<str> for VerificationCode {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
