//! State container scenarios: capture discipline, effect lifecycle,
//! snapshot preservation.

use chrono::{TimeZone, Utc};
use prism_state::{
    fixed_clock, Config, FuncEffect, PrismError, State, StackEffect, TimedEffect, ToggleEffect,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
struct Game {
    value: i64,
    name: String,
}

fn game(value: i64) -> Game {
    Game {
        value,
        name: "test".into(),
    }
}

fn new_state(value: i64) -> State<Game, String> {
    State::new(game(value), Config::default()).unwrap()
}

#[test]
fn basic_diff_cycle() {
    let state = State::<Game, String>::new(
        Game {
            value: 1,
            name: "a".into(),
        },
        Config::default(),
    )
    .unwrap();

    state.update(|g| g.value = 2);

    let patch = state.diff(None).unwrap().unwrap();
    assert_eq!(
        patch.to_bytes().unwrap(),
        br#"[{"op":"replace","path":"/value","value":2}]"#
    );
}

#[test]
fn set_replaces_and_captures() {
    let state = new_state(1);
    state.set(game(42));

    assert_eq!(state.get_base().value, 42);
    let patch = state.diff(None).unwrap().unwrap();
    assert!(String::from_utf8(patch.to_bytes().unwrap())
        .unwrap()
        .contains("42"));
}

#[test]
fn effect_order_is_insertion_order() {
    let state = new_state(1);
    state
        .add_effect(
            FuncEffect::new("plus-ten", |mut g: Game, _| {
                g.value += 10;
                g
            }),
            None,
        )
        .unwrap();
    state
        .add_effect(
            FuncEffect::new("double", |mut g: Game, _| {
                g.value *= 2;
                g
            }),
            None,
        )
        .unwrap();

    // (1 + 10) * 2, not (1 * 2) + 10.
    assert_eq!(state.get().value, 22);
}

#[test]
fn remove_preserves_relative_order() {
    let state = new_state(0);
    for id in ["a", "b", "c"] {
        state
            .add_effect(FuncEffect::new(id, |g: Game, _| g), None)
            .unwrap();
    }

    assert!(state.remove_effect("b"));

    let ids: Vec<String> = state
        .effects()
        .iter()
        .map(|e| e.id().to_owned())
        .collect();
    assert_eq!(ids, vec!["a".to_owned(), "c".to_owned()]);
}

#[test]
fn duplicate_id_leaves_list_unchanged() {
    let state = new_state(1);
    state
        .add_effect(
            FuncEffect::new("boost", |mut g: Game, _| {
                g.value += 1;
                g
            }),
            None,
        )
        .unwrap();

    let err = state
        .add_effect(
            FuncEffect::new("boost", |mut g: Game, _| {
                g.value += 100;
                g
            }),
            None,
        )
        .unwrap_err();

    assert!(matches!(err, PrismError::DuplicateEffect { .. }));
    assert_eq!(state.effects().len(), 1);
    assert_eq!(state.get().value, 2);
}

#[test]
fn activator_reaches_apply() {
    let state = new_state(100);

    // The activator is immune to its own effect.
    state
        .add_effect(
            FuncEffect::new("double-others", |mut g: Game, activator| {
                if activator.map(String::as_str) != Some("owner") {
                    g.value *= 2;
                }
                g
            }),
            Some("owner".to_owned()),
        )
        .unwrap();

    assert_eq!(state.get().value, 100);

    let effect = state.get_effect("double-others").unwrap();
    effect.set_activator(Some("someone-else".to_owned()));
    assert_eq!(state.get().value, 200);
}

#[test]
fn clear_effects_captures_only_when_nonempty() {
    let state = new_state(1);

    state.clear_effects();
    assert!(!state.has_changes());

    state
        .add_effect(FuncEffect::new("e", |g: Game, _| g), None)
        .unwrap();
    state.clear_previous();

    state.clear_effects();
    assert!(state.has_changes());
    assert!(state.effects().is_empty());
}

#[test]
fn cleanup_without_expired_is_inert() {
    let state = new_state(1);
    state
        .add_effect(FuncEffect::new("e", |g: Game, _| g), None)
        .unwrap();
    state.clear_previous();

    assert_eq!(state.cleanup_expired(), 0);
    assert!(!state.has_changes(), "no-op cleanup must not capture");
}

#[test]
fn cleanup_preserves_pending_snapshot() {
    let past = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let now = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();

    let state = new_state(100);

    // An already-expired timed effect.
    let expired = TimedEffect::window("old-buff", None, Some(past), |mut g: Game, _| {
        g.value += 5;
        g
    });
    expired.set_clock(Some(fixed_clock(now)));
    state.add_effect(expired, None).unwrap();
    state.clear_previous();

    // A pending update this cycle...
    state.update(|g| g.value = 200);

    // ...must survive the reap: cleanup may not overwrite the snapshot.
    assert_eq!(state.cleanup_expired(), 1);

    let patch = state.diff(None).unwrap().unwrap();
    let wire = String::from_utf8(patch.to_bytes().unwrap()).unwrap();
    assert!(wire.contains("200"), "pending delta lost: {wire}");
}

#[test]
fn cleanup_captures_when_no_snapshot_held() {
    let past = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let now = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();

    let state = new_state(1);
    let expired = TimedEffect::window("gone", None, Some(past), |mut g: Game, _| {
        g.value += 5;
        g
    });
    expired.set_clock(Some(fixed_clock(now)));
    state.add_effect(expired, None).unwrap();
    state.clear_previous();

    assert_eq!(state.cleanup_expired(), 1);
    assert!(state.has_changes(), "reap with no pending change must capture");
}

#[test]
fn toggle_effect_visible_through_state() {
    let state = new_state(1);
    let toggle = ToggleEffect::new("boost", |mut g: Game, _| {
        g.value += 100;
        g
    });
    state.add_effect(toggle.clone(), None).unwrap();

    assert_eq!(state.get().value, 101);
    toggle.disable();
    assert_eq!(state.get().value, 1);
    toggle.enable();
    assert_eq!(state.get().value, 101);
}

#[test]
fn stack_effect_combines_through_state() {
    let state = new_state(10);
    let multipliers = StackEffect::new("mult", |mut g: Game, factors: &[f64], _| {
        let total: f64 = factors.iter().product();
        g.value = (g.value as f64 * total) as i64;
        g
    });
    state.add_effect(multipliers.clone(), None).unwrap();

    // Empty stack is a no-op.
    assert_eq!(state.get().value, 10);

    multipliers.push(1.5);
    multipliers.push(2.0);
    assert_eq!(state.get().value, 30);

    multipliers.pop();
    assert_eq!(state.get().value, 15);
}

#[test]
fn full_state_applies_projection() {
    let state = new_state(7);
    let projection: prism_state::Projection<Game> = Arc::new(|mut g: Game| {
        g.name = String::new();
        g
    });

    let full = state.full_state(Some(&projection));
    assert_eq!(full.value, 7);
    assert_eq!(full.name, "");

    // Base untouched.
    assert_eq!(state.get_base().name, "test");
}

#[test]
fn timed_effect_without_clock_always_applies() {
    let state = new_state(1);
    let effect = TimedEffect::window("eternal", None, None, |mut g: Game, _| {
        g.value += 1;
        g
    });
    effect.set_clock(None);
    state.add_effect(effect.clone(), None).unwrap();

    assert_eq!(state.get().value, 2);
    assert!(!effect.expired());
    assert_eq!(state.cleanup_expired(), 0);
}

#[test]
fn update_then_clear_previous_resets() {
    let state = new_state(1);
    state.update(|g| g.value = 2);
    assert!(state.has_changes());

    state.clear_previous();
    assert!(!state.has_changes());
    assert!(state.diff(None).unwrap().is_none());
}
