#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriberStatus {
    Pending,
    Verified,
    Unsubscribed,
}

impl SubscriberStatus {
    /// Folds the two stored flags into one status. An unsubscribed row stays unsubscribed even
    /// if it was verified before.
    pub fn from_flags(is_verified: bool, unsubscribed: bool) -> SubscriberStatus {
        match (is_verified, unsubscribed) {
            (_, true) => SubscriberStatus::Unsubscribed,
            (true, false) => SubscriberStatus::Verified,
            (false, false) => SubscriberStatus::Pending,
        }
    }

    pub fn is_unsubscribed(&self) -> bool {
        matches!(self, SubscriberStatus::Unsubscribed)
    }
}
