//! Mode and target routing for the encoder.
//!
//! The router decides which incoming credentials are written and with which
//! algorithm. Its state is the encoder's published state, so every change
//! is reported to the caller for publication.

use odo_core::{CredentialCategory, Mode, Result, Target};
use odo_protocol::{CommandPayload, CredentialTopics};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Published router fields (`{"mode": ..., "target": ...}`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Router {
    mode: Mode,
    target: Target,
}

/// Outcome of routing one credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route {
    /// Write the credential.
    pub accepted: bool,
    /// The router state changed and must be published.
    pub changed: bool,
}

impl Router {
    pub fn new(mode: Mode, target: Target) -> Self {
        Self { mode, target }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn target(&self) -> Target {
        self.target
    }

    /// Set the mode. Returns `true` if it changed.
    pub fn set_mode(&mut self, mode: Mode) -> bool {
        if self.mode == mode {
            return false;
        }
        info!(from = %self.mode, to = %mode, "Mode changed");
        self.mode = mode;
        true
    }

    /// Set the target. Returns `true` if it changed.
    pub fn set_target(&mut self, target: Target) -> bool {
        if self.target == target {
            return false;
        }
        info!(from = %self.target, to = %target, "Target changed");
        self.target = target;
        true
    }

    /// Apply a `set` command carrying `mode` and/or `target`.
    ///
    /// Both values are validated before either is applied, so a rejected
    /// command leaves the router unchanged. Returns `true` if anything
    /// changed.
    ///
    /// # Errors
    /// Returns `Error::Configuration` for an unknown mode or target, or a
    /// value that is not a string.
    ///
    /// # Examples
    ///
    /// ```
    /// use odo_adapters::router::Router;
    /// use odo_core::{Mode, Target};
    /// use odo_protocol::CommandPayload;
    ///
    /// let mut router = Router::default();
    /// let command = CommandPayload::new().with("mode", "auto").with("target", "prox");
    /// assert!(router.apply_command(&command).unwrap());
    /// assert_eq!(router, Router::new(Mode::Auto, Target::Prox));
    ///
    /// let bad = CommandPayload::new().with("mode", "seen").with("target", "em4100");
    /// assert!(router.apply_command(&bad).is_err());
    /// assert_eq!(router.mode(), Mode::Auto);
    /// ```
    pub fn apply_command(&mut self, command: &CommandPayload) -> Result<bool> {
        let mode = command.get_str("mode")?.map(str::parse::<Mode>).transpose()?;
        let target = command
            .get_str("target")?
            .map(str::parse::<Target>)
            .transpose()?;

        let mut changed = false;
        if let Some(mode) = mode {
            changed |= self.set_mode(mode);
        }
        if let Some(target) = target {
            changed |= self.set_target(target);
        }
        Ok(changed)
    }

    /// Decide whether a credential received on a topic of `category` is
    /// written.
    ///
    /// A selected credential switches the router to [`Mode::Selected`]
    /// first. Written reports are never routed.
    pub fn route(&mut self, category: CredentialCategory) -> Route {
        let changed = match category {
            CredentialCategory::Selected => self.set_mode(Mode::Selected),
            _ => false,
        };

        let accepted = self.mode.accepts(category);
        if !accepted {
            debug!(%category, mode = %self.mode, "Credential not accepted in this mode");
        }

        Route { accepted, changed }
    }

    /// Route by topic name. Unrecognized topics are ignored.
    pub fn route_topic(&mut self, topics: &CredentialTopics, topic: &str) -> Route {
        match topics.category_of(topic) {
            Some(category) => self.route(category),
            None => {
                debug!(topic, "Unrecognized credential topic");
                Route {
                    accepted: false,
                    changed: false,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use odo_core::Error;
    use rstest::rstest;

    #[test]
    fn test_selected_preempts_seen() {
        let mut router = Router::new(Mode::Seen, Target::Iclass);

        let route = router.route(CredentialCategory::Selected);
        assert!(route.accepted);
        assert!(route.changed);
        assert_eq!(router.mode(), Mode::Selected);

        let route = router.route(CredentialCategory::Seen);
        assert!(!route.accepted);
        assert!(!route.changed);
    }

    #[rstest]
    #[case(Mode::Auto, CredentialCategory::Seen, true)]
    #[case(Mode::Auto, CredentialCategory::Written, false)]
    #[case(Mode::Seen, CredentialCategory::Seen, true)]
    #[case(Mode::Selected, CredentialCategory::Seen, false)]
    #[case(Mode::Seen, CredentialCategory::Written, false)]
    fn test_route_by_mode(
        #[case] mode: Mode,
        #[case] category: CredentialCategory,
        #[case] accepted: bool,
    ) {
        let mut router = Router::new(mode, Target::Iclass);
        let route = router.route(category);
        assert_eq!(route.accepted, accepted);
        assert!(!route.changed);
        assert_eq!(router.mode(), mode);
    }

    #[test]
    fn test_selected_in_selected_mode_is_not_a_change() {
        let mut router = Router::new(Mode::Selected, Target::Prox);
        let route = router.route(CredentialCategory::Selected);
        assert!(route.accepted);
        assert!(!route.changed);
    }

    #[test]
    fn test_unknown_topic_ignored() {
        let mut router = Router::new(Mode::Auto, Target::Iclass);
        let route = router.route_topic(&CredentialTopics::default(), "credentials/other");
        assert!(!route.accepted);
    }

    #[rstest]
    #[case(CommandPayload::new().with("mode", "bogus"))]
    #[case(CommandPayload::new().with("target", "em4100"))]
    #[case(CommandPayload::new().with("mode", "auto").with("target", "em4100"))]
    fn test_invalid_command_leaves_state(#[case] command: CommandPayload) {
        let mut router = Router::new(Mode::Seen, Target::Iclass);
        let result = router.apply_command(&command);

        assert!(matches!(result, Err(Error::Configuration(_))));
        assert_eq!(router, Router::new(Mode::Seen, Target::Iclass));
    }

    #[test]
    fn test_non_string_value_rejected() {
        let mut map = serde_json::Map::new();
        map.insert("mode".into(), serde_json::json!(3));
        let mut router = Router::default();

        assert!(matches!(
            router.apply_command(&CommandPayload::from(map)),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_unchanged_command() {
        let mut router = Router::new(Mode::Seen, Target::Iclass);
        let command = CommandPayload::new().with("mode", "seen");
        assert!(!router.apply_command(&command).unwrap());
        assert!(!router.apply_command(&CommandPayload::new()).unwrap());
    }

    #[test]
    fn test_serialized_fields() {
        let json = serde_json::to_value(Router::new(Mode::Auto, Target::Prox)).unwrap();
        assert_eq!(json, serde_json::json!({"mode": "auto", "target": "prox"}));
    }
}
