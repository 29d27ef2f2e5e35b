use chrono::Weekday;

const WEEKDAYS: [&str; 7] = ["mon", "tue", "wed", "thu", "fri", "sat", "sun"];

/// Days of the week a subscriber wants to receive comics on, as three letter abbreviations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryDays(Vec<String>);

impl DeliveryDays {
    pub fn parse(days: Vec<String>) -> Result<DeliveryDays, String> {
        let mut parsed: Vec<String> = Vec::with_capacity(days.len());

        for day in days {
            let day = day.trim().to_lowercase();

            if !WEEKDAYS.contains(&day.as_str()) {
                return Err(format!(
                    "{} is not a valid day. Use day abbreviations (e.g., [\"mon\", \"tue\"])",
                    day
                ));
            }

            if !parsed.contains(&day) {
                parsed.push(day);
            }
        }

        // Keep calendar order so the stored array is stable whatever order the client sent.
        parsed.sort_by_key(|day| WEEKDAYS.iter().position(|weekday| weekday == day));

        Ok(Self(parsed))
    }

    pub fn contains(&self, weekday: Weekday) -> bool {
        self.0.iter().any(|day| day == weekday_abbreviation(weekday))
    }

    pub fn into_inner(self) -> Vec<String> {
        self.0
    }
}

impl Default for DeliveryDays {
    fn default() -> Self {
        Self(WEEKDAYS.iter().map(|day| day.to_string()).collect())
    }
}

impl AsRef<[String]> for DeliveryDays {
    fn as_ref(&self) -> &[String] {
        &self.0
    }
}

pub fn weekday_abbreviation(weekday: Weekday) -> &'static str {
    WEEKDAYS[weekday.num_days_from_monday() as usize]
}
