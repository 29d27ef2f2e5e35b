mod comics;
mod health_check;
mod preferences;
mod registration;
mod unsubscribe;

pub use comics::handle_random_comic;
pub use health_check::health_check;
pub use preferences::{handle_get_preferences, handle_update_preferences};
pub use registration::{handle_register, handle_verify};
pub use unsubscribe::{handle_confirm_unsubscribe, handle_token_unsubscribe, handle_unsubscribe_request};

/// JSON body of every non-HTML response of the users API.
#[derive(serde::Serialize, serde::Deserialize, Debug)]
pub struct Message {
    pub msg: String,
}

impl Message {
    pub fn new(msg: impl Into<String>) -> Message {
        Message { msg: msg.into() }
    }
}
