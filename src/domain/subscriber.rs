use uuid::Uuid;

use crate::domain::delivery_days::DeliveryDays;
use crate::domain::subscriber_email::SubscriberEmail;
use crate::domain::subscriber_status::SubscriberStatus;
use crate::domain::time_key::TimeKey;

#[derive(Debug)]
pub struct Subscriber {
    pub id: Uuid,
    pub email: SubscriberEmail,
    pub status: SubscriberStatus,
    pub preferred_time: TimeKey,
    pub preferred_days: DeliveryDays,
}

/// The projection a delivery run needs: who to send to, nothing else.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryTarget {
    pub id: Uuid,
    pub email: SubscriberEmail,
}
