//! The timeout prompt shown during the warning window.
//!
//! Rendering is a pure function of visibility; the prompt owns no timers and
//! no state. Choices are forwarded to whoever implements [`PromptActions`].

use std::time::Duration;

use serde::Serialize;

use crate::guard::TimeoutDecision;

/// Receiver of the prompt's two actions.
pub trait PromptActions {
    fn on_stay_logged_in(&self);
    fn on_logout_now(&self);
}

/// One button of the prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PromptAction {
    pub decision: TimeoutDecision,
    pub label: &'static str,
    pub enabled: bool,
}

/// What the prompt displays when visible.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PromptView {
    pub title: &'static str,
    pub message: String,
    pub seconds_remaining: u64,
    pub actions: [PromptAction; 2],
}

pub struct TimeoutPrompt;

impl TimeoutPrompt {
    /// Renders the prompt, or nothing when it is hidden.
    pub fn render(visible: bool, warning_lead: Duration) -> Option<PromptView> {
        if !visible {
            return None;
        }

        let seconds_remaining = warning_lead.as_secs();
        Some(PromptView {
            title: "Session Timeout Warning",
            message: format!(
                "Your session is about to expire due to inactivity. \
                 You will be logged out in {} seconds.",
                seconds_remaining
            ),
            seconds_remaining,
            actions: [
                PromptAction {
                    decision: TimeoutDecision::StayLoggedIn,
                    label: "Stay Logged In",
                    enabled: true,
                },
                PromptAction {
                    decision: TimeoutDecision::LogoutNow,
                    label: "Logout Now",
                    enabled: true,
                },
            ],
        })
    }
}

impl PromptView {
    /// Invokes exactly one action for `decision`.
    pub fn choose(&self, decision: TimeoutDecision, actions: &dyn PromptActions) {
        tracing::debug!(?decision, "timeout prompt answered");
        match decision {
            TimeoutDecision::StayLoggedIn => actions.on_stay_logged_in(),
            TimeoutDecision::LogoutNow => actions.on_logout_now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[derive(Default)]
    struct Recorder {
        calls: RefCell<Vec<&'static str>>,
    }

    impl PromptActions for Recorder {
        fn on_stay_logged_in(&self) {
            self.calls.borrow_mut().push("stay");
        }

        fn on_logout_now(&self) {
            self.calls.borrow_mut().push("logout");
        }
    }

    #[test]
    fn hidden_prompt_renders_nothing() {
        assert!(TimeoutPrompt::render(false, Duration::from_secs(30)).is_none());
    }

    #[test]
    fn visible_prompt_offers_both_actions() {
        let view = TimeoutPrompt::render(true, Duration::from_secs(30)).unwrap();
        assert_eq!(view.seconds_remaining, 30);
        assert!(view.message.contains("30 seconds"));
        assert!(view.actions.iter().all(|action| action.enabled));
        assert_eq!(view.actions[0].decision, TimeoutDecision::StayLoggedIn);
        assert_eq!(view.actions[1].decision, TimeoutDecision::LogoutNow);
    }

    #[test]
    fn each_choice_invokes_exactly_one_callback() {
        let view = TimeoutPrompt::render(true, Duration::from_secs(30)).unwrap();
        let recorder = Recorder::default();

        view.choose(TimeoutDecision::StayLoggedIn, &recorder);
        assert_eq!(*recorder.calls.borrow(), vec!["stay"]);

        view.choose(TimeoutDecision::LogoutNow, &recorder);
        assert_eq!(*recorder.calls.borrow(), vec!["stay", "logout"]);
    }
}
