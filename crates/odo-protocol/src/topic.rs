//! Bus topic layout.

use odo_core::{
    CredentialCategory,
    constants::{
        COMMAND_TOPIC_SUFFIX, DEFAULT_SEEN_TOPIC, DEFAULT_SELECTED_TOPIC, DEFAULT_WRITTEN_TOPIC,
        DEVICE_TOPIC_PREFIX, STATE_TOPIC_SUFFIX,
    },
};
use serde::{Deserialize, Serialize};

/// Topics carrying credentials, one per category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialTopics {
    pub seen: String,
    pub selected: String,
    pub written: String,
}

impl Default for CredentialTopics {
    fn default() -> Self {
        Self {
            seen: DEFAULT_SEEN_TOPIC.to_string(),
            selected: DEFAULT_SELECTED_TOPIC.to_string(),
            written: DEFAULT_WRITTEN_TOPIC.to_string(),
        }
    }
}

impl CredentialTopics {
    /// Topic for a category.
    pub fn topic(&self, category: CredentialCategory) -> &str {
        match category {
            CredentialCategory::Seen => &self.seen,
            CredentialCategory::Selected => &self.selected,
            CredentialCategory::Written => &self.written,
        }
    }

    /// Category of a credential topic, if `topic` is one.
    ///
    /// ```
    /// use odo_core::CredentialCategory;
    /// use odo_protocol::CredentialTopics;
    ///
    /// let topics = CredentialTopics::default();
    /// assert_eq!(topics.category_of("credentials/selected"), Some(CredentialCategory::Selected));
    /// assert_eq!(topics.category_of("devices/proxmark3/cmd"), None);
    /// ```
    pub fn category_of(&self, topic: &str) -> Option<CredentialCategory> {
        [
            CredentialCategory::Seen,
            CredentialCategory::Selected,
            CredentialCategory::Written,
        ]
        .into_iter()
        .find(|category| self.topic(*category) == topic)
    }
}

/// Per-adapter topics (`devices/<adapter>/state` and `devices/<adapter>/cmd`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceTopics {
    pub state: String,
    pub command: String,
}

impl DeviceTopics {
    pub fn for_adapter(name: &str) -> Self {
        Self {
            state: format!("{DEVICE_TOPIC_PREFIX}/{name}/{STATE_TOPIC_SUFFIX}"),
            command: format!("{DEVICE_TOPIC_PREFIX}/{name}/{COMMAND_TOPIC_SUFFIX}"),
        }
    }
}
