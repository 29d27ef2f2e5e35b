use serde::{Deserialize, Serialize};

/// One comic as published by the xkcd JSON API (`/{num}/info.0.json`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comic {
    pub num: u32,
    pub title: String,
    pub img: String,
    #[serde(default)]
    pub alt: String,
    #[serde(default)]
    pub transcript: String,
    pub year: String,
    pub month: String,
    pub day: String,
}

impl Comic {
    /// Sent instead of a real comic when the catalog cannot be reached.
    pub fn placeholder() -> Comic {
        Comic {
            num: 0,
            title: String::from("XKCD Comic"),
            img: String::from("https://imgs.xkcd.com/static/comic_info.png"),
            alt: String::from("XKCD Comic Image"),
            transcript: String::from("Unable to fetch XKCD comic at this time."),
            year: String::from("2023"),
            month: String::from("1"),
            day: String::from("1"),
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.num == 0
    }
}
