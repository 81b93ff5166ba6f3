//! The inactivity state machine as a pure transition function.
//!
//! `transition` never touches timers or callbacks; it returns the next state
//! and the ordered list of effects the driver must apply. Every armed timer
//! carries the generation it was armed with, and a firing whose generation is
//! not the current one is ignored.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::activity::ActivitySignal;
use crate::config::GuardConfig;

/// Phase of a guard instance.
///
/// Moves forward `Active -> Warning -> Expired`, or back to `Active` on
/// activity or an explicit "stay logged in". `Expired` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Active,
    Warning,
    Expired,
}

/// The user's answer to the timeout prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeoutDecision {
    StayLoggedIn,
    LogoutNow,
}

/// Inputs to the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardEvent {
    Activity(ActivitySignal),
    WarnElapsed { generation: u64 },
    ExpireElapsed { generation: u64 },
    Decision(TimeoutDecision),
}

/// Side effects requested by a transition, applied in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    ArmWarn { delay: Duration, generation: u64 },
    ArmExpire { delay: Duration, generation: u64 },
    CancelWarn,
    CancelExpire,
    ShowPrompt,
    HidePrompt,
    /// Idle logout.
    Timeout,
    /// User-initiated logout.
    Logout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuardState {
    pub phase: Phase,
    pub last_activity_at: Instant,
    /// When the warn timer was last re-armed; used to coalesce bursts.
    pub last_reset_at: Instant,
    /// Stamp of the only timer allowed to act.
    pub generation: u64,
}

impl GuardState {
    pub fn new(now: Instant) -> Self {
        Self {
            phase: Phase::Active,
            last_activity_at: now,
            last_reset_at: now,
            generation: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub state: GuardState,
    pub effects: Vec<Effect>,
}

impl Transition {
    fn unchanged(state: &GuardState) -> Self {
        Self {
            state: *state,
            effects: Vec::new(),
        }
    }
}

/// Initial state plus the first warn timer.
pub fn start(config: &GuardConfig, now: Instant) -> Transition {
    let mut state = GuardState::new(now);
    state.generation = 1;
    Transition {
        state,
        effects: vec![Effect::ArmWarn {
            delay: config.warn_delay(),
            generation: state.generation,
        }],
    }
}

pub fn transition(
    state: &GuardState,
    config: &GuardConfig,
    event: GuardEvent,
    now: Instant,
) -> Transition {
    match (state.phase, event) {
        (Phase::Expired, _) => Transition::unchanged(state),

        (Phase::Active, GuardEvent::Activity(signal)) => {
            let mut next = *state;
            next.last_activity_at = now;

            let since_reset = now.saturating_duration_since(state.last_reset_at);
            if signal.kind.is_high_frequency() && since_reset < config.coalesce_window() {
                // the pending warn timer re-checks idle time when it fires
                return Transition {
                    state: next,
                    effects: Vec::new(),
                };
            }

            rearm_warn(next, config.warn_delay(), now, Vec::new())
        }

        (Phase::Active, GuardEvent::Decision(TimeoutDecision::StayLoggedIn)) => {
            let mut next = *state;
            next.last_activity_at = now;
            rearm_warn(next, config.warn_delay(), now, Vec::new())
        }

        (Phase::Active, GuardEvent::WarnElapsed { generation }) => {
            if generation != state.generation {
                return Transition::unchanged(state);
            }

            let idle = now.saturating_duration_since(state.last_activity_at);
            if idle < config.warn_delay() {
                return rearm_warn(*state, config.warn_delay() - idle, now, Vec::new());
            }

            let mut next = *state;
            next.phase = Phase::Warning;
            next.generation += 1;
            Transition {
                state: next,
                effects: vec![
                    Effect::ShowPrompt,
                    Effect::ArmExpire {
                        delay: config.warning_lead(),
                        generation: next.generation,
                    },
                ],
            }
        }

        (Phase::Active, GuardEvent::Decision(TimeoutDecision::LogoutNow)) => {
            let mut next = *state;
            next.phase = Phase::Expired;
            next.generation += 1;
            Transition {
                state: next,
                effects: vec![Effect::CancelWarn, Effect::Logout],
            }
        }

        (Phase::Active, GuardEvent::ExpireElapsed { .. }) => Transition::unchanged(state),

        (Phase::Warning, GuardEvent::Activity(_))
        | (Phase::Warning, GuardEvent::Decision(TimeoutDecision::StayLoggedIn)) => {
            let mut next = *state;
            next.phase = Phase::Active;
            next.last_activity_at = now;
            rearm_warn(
                next,
                config.warn_delay(),
                now,
                vec![Effect::CancelExpire, Effect::HidePrompt],
            )
        }

        (Phase::Warning, GuardEvent::ExpireElapsed { generation }) => {
            if generation != state.generation {
                return Transition::unchanged(state);
            }

            let mut next = *state;
            next.phase = Phase::Expired;
            next.generation += 1;
            Transition {
                state: next,
                effects: vec![Effect::HidePrompt, Effect::Timeout],
            }
        }

        (Phase::Warning, GuardEvent::Decision(TimeoutDecision::LogoutNow)) => {
            let mut next = *state;
            next.phase = Phase::Expired;
            next.generation += 1;
            Transition {
                state: next,
                effects: vec![Effect::CancelExpire, Effect::HidePrompt, Effect::Logout],
            }
        }

        (Phase::Warning, GuardEvent::WarnElapsed { .. }) => Transition::unchanged(state),
    }
}

fn rearm_warn(
    mut next: GuardState,
    delay: Duration,
    now: Instant,
    mut effects: Vec<Effect>,
) -> Transition {
    next.generation += 1;
    next.last_reset_at = now;
    effects.push(Effect::CancelWarn);
    effects.push(Effect::ArmWarn {
        delay,
        generation: next.generation,
    });
    Transition {
        state: next,
        effects,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::ActivityKind;

    const SEC: Duration = Duration::from_secs(1);

    fn config() -> GuardConfig {
        GuardConfig::from_minutes(5).unwrap()
    }

    fn signal(kind: ActivityKind) -> GuardEvent {
        GuardEvent::Activity(ActivitySignal::new(kind))
    }

    fn armed_generation(effects: &[Effect]) -> Option<u64> {
        effects.iter().find_map(|effect| match effect {
            Effect::ArmWarn { generation, .. } | Effect::ArmExpire { generation, .. } => {
                Some(*generation)
            }
            _ => None,
        })
    }

    #[test]
    fn start_arms_warn_timer_for_idle_minus_lead() {
        let t0 = Instant::now();
        let started = start(&config(), t0);
        assert_eq!(started.state.phase, Phase::Active);
        assert_eq!(started.state.last_activity_at, t0);
        assert_eq!(
            started.effects,
            vec![Effect::ArmWarn {
                delay: Duration::from_millis(270_000),
                generation: 1
            }]
        );
    }

    #[test]
    fn warn_elapsed_enters_warning_and_arms_expire() {
        let t0 = Instant::now();
        let config = config();
        let state = start(&config, t0).state;

        let warned = transition(
            &state,
            &config,
            GuardEvent::WarnElapsed { generation: 1 },
            t0 + Duration::from_millis(270_000),
        );
        assert_eq!(warned.state.phase, Phase::Warning);
        assert_eq!(
            warned.effects,
            vec![
                Effect::ShowPrompt,
                Effect::ArmExpire {
                    delay: Duration::from_millis(30_000),
                    generation: 2
                }
            ]
        );

        let expired = transition(
            &warned.state,
            &config,
            GuardEvent::ExpireElapsed { generation: 2 },
            t0 + Duration::from_millis(300_000),
        );
        assert_eq!(expired.state.phase, Phase::Expired);
        assert_eq!(expired.effects, vec![Effect::HidePrompt, Effect::Timeout]);
    }

    #[test]
    fn stale_timer_firings_are_ignored() {
        let t0 = Instant::now();
        let config = config();
        let state = start(&config, t0).state;
        let reset = transition(&state, &config, signal(ActivityKind::KeyDown), t0 + 10 * SEC);
        assert_eq!(armed_generation(&reset.effects), Some(2));

        let stale = transition(
            &reset.state,
            &config,
            GuardEvent::WarnElapsed { generation: 1 },
            t0 + 270 * SEC,
        );
        assert_eq!(stale.state, reset.state);
        assert!(stale.effects.is_empty());

        let stray_expire = transition(
            &reset.state,
            &config,
            GuardEvent::ExpireElapsed { generation: 2 },
            t0 + 300 * SEC,
        );
        assert!(stray_expire.effects.is_empty());
    }

    #[test]
    fn discrete_activity_rearms_without_visible_effects() {
        let t0 = Instant::now();
        let config = config();
        let state = start(&config, t0).state;
        let next = transition(&state, &config, signal(ActivityKind::PointerDown), t0 + 5 * SEC);

        assert_eq!(next.state.phase, Phase::Active);
        assert_eq!(next.state.last_activity_at, t0 + 5 * SEC);
        assert!(!next.effects.contains(&Effect::ShowPrompt));
        assert!(!next.effects.contains(&Effect::HidePrompt));
        assert_eq!(
            next.effects.last(),
            Some(&Effect::ArmWarn {
                delay: config.warn_delay(),
                generation: 2
            })
        );
    }

    #[test]
    fn high_frequency_bursts_are_coalesced() {
        let t0 = Instant::now();
        let config = config();
        let state = start(&config, t0).state;

        let moved = transition(
            &state,
            &config,
            signal(ActivityKind::PointerMove),
            t0 + Duration::from_millis(200),
        );
        assert!(moved.effects.is_empty());
        assert_eq!(moved.state.last_activity_at, t0 + Duration::from_millis(200));
        assert_eq!(moved.state.generation, state.generation);

        let later = transition(
            &moved.state,
            &config,
            signal(ActivityKind::Scroll),
            t0 + 2 * SEC,
        );
        assert_eq!(armed_generation(&later.effects), Some(2));
    }

    #[test]
    fn coalesced_activity_defers_the_warning() {
        let t0 = Instant::now();
        let config = config();
        let state = start(&config, t0).state;
        let moved = transition(
            &state,
            &config,
            signal(ActivityKind::PointerMove),
            t0 + Duration::from_millis(500),
        );

        let fired = transition(
            &moved.state,
            &config,
            GuardEvent::WarnElapsed { generation: 1 },
            t0 + config.warn_delay(),
        );
        assert_eq!(fired.state.phase, Phase::Active);
        assert_eq!(
            fired.effects.last(),
            Some(&Effect::ArmWarn {
                delay: Duration::from_millis(500),
                generation: 2
            })
        );
    }

    #[test]
    fn activity_or_stay_in_warning_returns_to_active() {
        let t0 = Instant::now();
        let config = config();
        let state = start(&config, t0).state;
        let warned = transition(
            &state,
            &config,
            GuardEvent::WarnElapsed { generation: 1 },
            t0 + 270 * SEC,
        )
        .state;

        for event in [
            signal(ActivityKind::PointerMove),
            GuardEvent::Decision(TimeoutDecision::StayLoggedIn),
        ] {
            let reset = transition(&warned, &config, event, t0 + 280 * SEC);
            assert_eq!(reset.state.phase, Phase::Active);
            assert_eq!(reset.state.last_activity_at, t0 + 280 * SEC);
            assert_eq!(&reset.effects[..2], &[Effect::CancelExpire, Effect::HidePrompt]);

            // the expire timer armed on entering Warning is now stale
            let late = transition(
                &reset.state,
                &config,
                GuardEvent::ExpireElapsed {
                    generation: warned.generation,
                },
                t0 + 300 * SEC,
            );
            assert_eq!(late.state.phase, Phase::Active);
            assert!(late.effects.is_empty());
        }
    }

    #[test]
    fn logout_now_is_terminal() {
        let t0 = Instant::now();
        let config = config();
        let state = start(&config, t0).state;
        let warned = transition(
            &state,
            &config,
            GuardEvent::WarnElapsed { generation: 1 },
            t0 + 270 * SEC,
        )
        .state;

        let out = transition(
            &warned,
            &config,
            GuardEvent::Decision(TimeoutDecision::LogoutNow),
            t0 + 275 * SEC,
        );
        assert_eq!(out.state.phase, Phase::Expired);
        assert_eq!(
            out.effects,
            vec![Effect::CancelExpire, Effect::HidePrompt, Effect::Logout]
        );

        for event in [
            signal(ActivityKind::KeyDown),
            GuardEvent::Decision(TimeoutDecision::StayLoggedIn),
            GuardEvent::Decision(TimeoutDecision::LogoutNow),
            GuardEvent::ExpireElapsed {
                generation: out.state.generation,
            },
        ] {
            let after = transition(&out.state, &config, event, t0 + 400 * SEC);
            assert_eq!(after.state.phase, Phase::Expired);
            assert!(after.effects.is_empty());
        }
    }

    #[test]
    fn logout_from_active_skips_the_prompt() {
        let t0 = Instant::now();
        let config = config();
        let state = start(&config, t0).state;
        let out = transition(
            &state,
            &config,
            GuardEvent::Decision(TimeoutDecision::LogoutNow),
            t0 + SEC,
        );
        assert_eq!(out.state.phase, Phase::Expired);
        assert_eq!(out.effects, vec![Effect::CancelWarn, Effect::Logout]);
    }
}
