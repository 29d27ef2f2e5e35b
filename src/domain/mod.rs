pub mod comic;
pub mod delivery_days;
pub mod new_subscriber;
pub mod subscriber;
pub mod subscriber_email;
pub mod subscriber_status;
pub mod time_key;
pub mod unsubscribe_token;
pub mod verification_code;
