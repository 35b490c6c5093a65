//! Account data the engine reads from the user store.

use serde::{Deserialize, Serialize};

/// User as seen by the invitation scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAccount {
    /// User id.
    pub id: u64,
    /// Blocked users never receive invitations.
    pub blocked: bool,
    /// Delivery address.
    pub email: String,
    /// Name used in the greeting.
    pub display_name: String,
    /// Language code for the template (e.g. `"es"`).
    pub preferred_language: String,
}
