use uuid::Uuid;

use crate::models::geofence::Geofence;
use crate::models::vehicle::{GeofenceState, GeofenceStateMap};

/// One containment edge for a (vehicle, geofence) pair.
#[derive(Debug, Clone, PartialEq)]
pub struct GeofenceTransition {
    pub geofence_id: Uuid,
    pub geofence_name: String,
    pub entered: bool,
}

/// Evaluate every assigned, active geofence against the current position
/// and mutate the per-vehicle state map in place.
///
/// A transition is emitted only on an actual inside/outside edge, and only
/// while the corresponding notification toggle is on and no alert of that
/// direction is already pending. Containment itself is tracked regardless
/// of the toggles, so enabling notifications later does not replay old
/// edges.
pub fn evaluate(
    states: &mut GeofenceStateMap,
    fences: &[Geofence],
    lat: f64,
    lon: f64,
) -> Vec<GeofenceTransition> {
    // Fences that were unassigned or deactivated no longer get evaluated;
    // drop their stale entries so the map tracks the assignment set.
    states.retain(|id, _| fences.iter().any(|f| f.geofence_id == *id));

    let mut transitions = Vec::new();

    for fence in fences {
        let inside = fence.contains(lat, lon);
        let state = states.entry(fence.geofence_id).or_insert_with(GeofenceState::default);

        if inside && !state.inside {
            state.inside = true;
            if fence.notify_on_entry && !state.entry_alert_sent {
                state.entry_alert_sent = true;
                state.exit_alert_sent = false;
                transitions.push(GeofenceTransition {
                    geofence_id: fence.geofence_id,
                    geofence_name: fence.name.clone(),
                    entered: true,
                });
            }
        } else if !inside && state.inside {
            state.inside = false;
            if fence.notify_on_exit && !state.exit_alert_sent {
                state.exit_alert_sent = true;
                state.entry_alert_sent = false;
                transitions.push(GeofenceTransition {
                    geofence_id: fence.geofence_id,
                    geofence_name: fence.name.clone(),
                    entered: false,
                });
            }
        }
    }

    transitions
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::types::Json;
    use crate::models::geofence::{Vertex, KIND_CIRCLE, KIND_POLYGON};

    fn circle(name: &str, lat: f64, lon: f64, radius_m: f64) -> Geofence {
        Geofence {
            geofence_id: Uuid::new_v4(),
            name: name.into(),
            kind: KIND_CIRCLE.into(),
            center_lat: Some(lat),
            center_lon: Some(lon),
            radius_m: Some(radius_m),
            vertices: None,
            active: true,
            notify_on_entry: true,
            notify_on_exit: true,
        }
    }

    const INSIDE: (f64, f64) = (20.6525, -100.3914);
    const OUTSIDE: (f64, f64) = (20.7525, -100.3914);

    #[test]
    fn entry_and_exit_each_emit_exactly_once() {
        let fence = circle("depot", INSIDE.0, INSIDE.1, 500.0);
        let fences = vec![fence.clone()];
        let mut states = GeofenceStateMap::new();

        // Approach from outside: no transition, state tracked.
        let out = evaluate(&mut states, &fences, OUTSIDE.0, OUTSIDE.1);
        assert!(out.is_empty());
        assert!(!states[&fence.geofence_id].inside);

        // Cross in: one entry.
        let out = evaluate(&mut states, &fences, INSIDE.0, INSIDE.1);
        assert_eq!(out.len(), 1);
        assert!(out[0].entered);
        assert_eq!(out[0].geofence_id, fence.geofence_id);

        // Stay in across many frames: silence.
        for _ in 0..5 {
            assert!(evaluate(&mut states, &fences, INSIDE.0, INSIDE.1).is_empty());
        }

        // Cross out: one exit.
        let out = evaluate(&mut states, &fences, OUTSIDE.0, OUTSIDE.1);
        assert_eq!(out.len(), 1);
        assert!(!out[0].entered);

        // Stay out: silence.
        assert!(evaluate(&mut states, &fences, OUTSIDE.0, OUTSIDE.1).is_empty());

        // Re-enter: the entry flag was cleared by the exit, so a fresh
        // entry fires.
        let out = evaluate(&mut states, &fences, INSIDE.0, INSIDE.1);
        assert_eq!(out.len(), 1);
        assert!(out[0].entered);
    }

    #[test]
    fn starting_inside_emits_an_entry() {
        let fence = circle("depot", INSIDE.0, INSIDE.1, 500.0);
        let mut states = GeofenceStateMap::new();
        let out = evaluate(&mut states, &[fence], INSIDE.0, INSIDE.1);
        assert_eq!(out.len(), 1);
        assert!(out[0].entered);
    }

    #[test]
    fn disabled_toggles_suppress_emission_but_track_containment() {
        let mut fence = circle("depot", INSIDE.0, INSIDE.1, 500.0);
        fence.notify_on_entry = false;
        let fences = vec![fence.clone()];
        let mut states = GeofenceStateMap::new();

        assert!(evaluate(&mut states, &fences, INSIDE.0, INSIDE.1).is_empty());
        assert!(states[&fence.geofence_id].inside);

        // Exit still notifies.
        let out = evaluate(&mut states, &fences, OUTSIDE.0, OUTSIDE.1);
        assert_eq!(out.len(), 1);
        assert!(!out[0].entered);
    }

    #[test]
    fn unassigned_fence_state_is_pruned() {
        let fence = circle("depot", INSIDE.0, INSIDE.1, 500.0);
        let gone = Uuid::new_v4();
        let mut states = GeofenceStateMap::new();
        states.insert(gone, GeofenceState { inside: true, entry_alert_sent: true, exit_alert_sent: false });

        evaluate(&mut states, &[fence.clone()], INSIDE.0, INSIDE.1);
        assert!(!states.contains_key(&gone));
        assert!(states.contains_key(&fence.geofence_id));
    }

    #[test]
    fn polygon_fences_transition_too() {
        let fence = Geofence {
            geofence_id: Uuid::new_v4(),
            name: "yard".into(),
            kind: KIND_POLYGON.into(),
            center_lat: None,
            center_lon: None,
            radius_m: None,
            vertices: Some(Json(vec![
                Vertex { lat: 20.0, lon: -101.0 },
                Vertex { lat: 20.0, lon: -100.0 },
                Vertex { lat: 21.0, lon: -100.0 },
                Vertex { lat: 21.0, lon: -101.0 },
            ])),
            active: true,
            notify_on_entry: true,
            notify_on_exit: true,
        };
        let fences = vec![fence];
        let mut states = GeofenceStateMap::new();

        let out = evaluate(&mut states, &fences, 20.5, -100.5);
        assert_eq!(out.len(), 1);
        assert!(out[0].entered);

        let out = evaluate(&mut states, &fences, 25.0, -100.5);
        assert_eq!(out.len(), 1);
        assert!(!out[0].entered);
    }

    #[test]
    fn multiple_fences_evaluate_independently() {
        let a = circle("a", INSIDE.0, INSIDE.1, 500.0);
        let b = circle("b", OUTSIDE.0, OUTSIDE.1, 500.0);
        let fences = vec![a.clone(), b.clone()];
        let mut states = GeofenceStateMap::new();

        // Inside a, outside b.
        let out = evaluate(&mut states, &fences, INSIDE.0, INSIDE.1);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].geofence_id, a.geofence_id);

        // Move to b: exit a, enter b, in one frame.
        let out = evaluate(&mut states, &fences, OUTSIDE.0, OUTSIDE.1);
        assert_eq!(out.len(), 2);
        assert!(out.iter().any(|t| t.geofence_id == a.geofence_id && !t.entered));
        assert!(out.iter().any(|t| t.geofence_id == b.geofence_id && t.entered));
    }
}
