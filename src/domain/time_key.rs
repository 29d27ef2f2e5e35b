const DEFAULT_HOUR: u32 = 9;
const DEFAULT_MINUTE: u32 = 0;

/// A `HH:MM` time-of-day slot. Many subscribers can share the same key, and the scheduler keeps
/// exactly one daily timer per distinct key.
///
/// Values read back from storage are wrapped as they are (see [`TimeKey::from_stored`]); only
/// values coming from users go through [`TimeKey::parse`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimeKey(String);

impl TimeKey {
    /// Accepts the `HH:MM` shape used by the preferences form: two digits (the first one in
    /// `0..=2`), a colon, two digits (the first one in `0..=5`).
    pub fn parse(value: String) -> Result<TimeKey, String> {
        let bytes = value.as_bytes();
        let is_valid = bytes.len() == 5
            && matches!(bytes[0], b'0'..=b'2')
            && bytes[1].is_ascii_digit()
            && bytes[2] == b':'
            && matches!(bytes[3], b'0'..=b'5')
            && bytes[4].is_ascii_digit();

        if !is_valid {
            return Err(format!(
                "{} is not a valid time. Use HH:MM (24-hour format).",
                value
            ));
        }

        Ok(Self(value))
    }

    pub fn from_stored(value: String) -> TimeKey {
        Self(value)
    }

    /// Hour and minute this key fires at. Malformed components degrade to 09 and 00 instead of
    /// being rejected, so a bad stored value still yields a working timer.
    pub fn hour_minute(&self) -> (u32, u32) {
        let mut parts = self.0.splitn(2, ':');
        let hour = parse_component(parts.next(), 23);
        let minute = parse_component(parts.next(), 59);

        if hour.is_none() || minute.is_none() {
            tracing::warn!(time_key = %self.0, "Malformed delivery time, falling back to defaults");
        }

        (
            hour.unwrap_or(DEFAULT_HOUR),
            minute.unwrap_or(DEFAULT_MINUTE),
        )
    }
}

fn parse_component(component: Option<&str>, max: u32) -> Option<u32> {
    let component = component?.trim();

    if component.is_empty() {
        return None;
    }

    component.parse::<u32>().ok().filter(|value| *value <= max)
}

impl AsRef<str> for TimeKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TimeKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}
