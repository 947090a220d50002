//! Concurrency smoke tests: no deadlocks, no lost writes, consistent reads
//! under parallel access.

use prism_state::{Config, FuncEffect, Schedulable, Session, StackEffect, State, TimedEffect};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
struct Game {
    value: i64,
}

fn new_state(value: i64) -> Arc<State<Game, String>> {
    Arc::new(State::new(Game { value }, Config::default()).unwrap())
}

#[test]
fn concurrent_updates_are_not_lost() {
    let state = new_state(0);

    thread::scope(|s| {
        for _ in 0..4 {
            s.spawn(|| {
                for _ in 0..100 {
                    state.update(|g| g.value += 1);
                }
            });
        }
        for _ in 0..4 {
            s.spawn(|| {
                for _ in 0..100 {
                    let _ = state.get();
                    let _ = state.diff(None);
                    let _ = state.has_changes();
                }
            });
        }
    });

    assert_eq!(state.get_base().value, 400);
}

#[test]
fn concurrent_session_operations() {
    let state = new_state(0);
    let session: Arc<Session<Game, String, usize>> = Session::new(state);

    thread::scope(|s| {
        s.spawn(|| {
            for i in 0..50 {
                session.connect(i, None);
            }
        });
        s.spawn(|| {
            for i in 50..100 {
                session.connect(i, None);
                session.disconnect(&i);
            }
        });
        s.spawn(|| {
            for _ in 0..50 {
                session.state().update(|g| g.value += 1);
                session.tick();
            }
        });
        s.spawn(|| {
            for i in 0..50 {
                let _ = session.is_connected(&i);
                let _ = session.count();
                let _ = session.ids();
            }
        });
    });

    assert_eq!(session.count(), 50);
    assert_eq!(session.state().get_base().value, 50);
}

#[test]
fn concurrent_effect_mutation_and_reads() {
    let state = new_state(1);
    let stack = StackEffect::new("mult", |mut g: Game, factors: &[i64], _| {
        g.value *= factors.iter().product::<i64>();
        g
    });
    state.add_effect(stack.clone(), None).unwrap();

    thread::scope(|s| {
        s.spawn(|| {
            for _ in 0..100 {
                stack.push(1);
            }
        });
        s.spawn(|| {
            for _ in 0..50 {
                let _ = stack.pop();
                let _ = stack.count();
            }
        });
        s.spawn(|| {
            for _ in 0..100 {
                let _ = state.get();
            }
        });
    });

    // Neutral factors throughout, so reads always saw value 1.
    assert_eq!(state.get().value, 1);
    assert!(stack.count() >= 50);
}

#[test]
fn concurrent_add_remove_effects() {
    let state = new_state(0);

    thread::scope(|s| {
        s.spawn(|| {
            for i in 0..50 {
                let _ = state.add_effect(
                    FuncEffect::new(format!("a-{i}"), |g: Game, _| g),
                    None,
                );
            }
        });
        s.spawn(|| {
            for i in 0..50 {
                let _ = state.add_effect(
                    FuncEffect::new(format!("b-{i}"), |g: Game, _| g),
                    None,
                );
                let _ = state.remove_effect(&format!("b-{i}"));
            }
        });
        s.spawn(|| {
            for i in 0..50 {
                let _ = state.has_effect(&format!("a-{i}"));
                let _ = state.effects();
            }
        });
    });

    assert_eq!(state.effects().len(), 50);
}

#[test]
fn concurrent_timed_effect_access() {
    let effect = TimedEffect::<Game, String>::expiring(
        "buff",
        Duration::from_secs(60),
        |g: Game, _| g,
    );

    thread::scope(|s| {
        s.spawn(|| {
            for _ in 0..100 {
                let _ = effect.active();
                let _ = effect.remaining();
                let _ = effect.expired();
            }
        });
        s.spawn(|| {
            for _ in 0..100 {
                effect.extend(Duration::from_millis(1));
            }
        });
        s.spawn(|| {
            for _ in 0..20 {
                let _ = effect.schedule_expiration(Box::new(|_| {}));
            }
            effect.cancel_scheduled_expiration();
        });
    });

    assert!(effect.active());
}

#[test]
fn timer_callback_can_reenter_tick() {
    // A timer callback calling back into the session must not deadlock:
    // callbacks run holding no core lock and take session -> state in order.
    let state = new_state(1);
    let session: Arc<Session<Game, String, String>> = Session::new(state);
    session.connect("a".into(), None);

    let boost = TimedEffect::expiring("boost", Duration::from_millis(30), |mut g: Game, _| {
        g.value += 1;
        g
    });
    session.add_effect_with_expiration(boost, None).unwrap();
    session.tick();

    // While the expiry timer is pending, keep the locks busy.
    for _ in 0..20 {
        session.state().update(|g| g.value += 1);
        session.tick();
        thread::sleep(Duration::from_millis(5));
    }

    thread::sleep(Duration::from_millis(300));
    assert!(!session.state().has_effect("boost"));
}
