use nalgebra::{UnitQuaternion, Vector3};

use super::forces::Wrench;
use crate::body::{Body, BodyState};

/// Unconstrained velocities after one step of the external wrenches.
/// The gyroscopic term `-w x (I w)` is included in the angular update.
pub fn predict_velocities(bodies: &[Body], wrenches: &[Wrench], dt: f64) -> Vec<BodyState> {
    bodies
        .iter()
        .zip(wrenches)
        .map(|(body, wrench)| {
            let mut state = body.state;
            if body.is_fixed() {
                state.linear_velocity = Vector3::zeros();
                state.angular_velocity = Vector3::zeros();
                return state;
            }
            let w = state.angular_velocity;
            let gyroscopic = w.cross(&(body.inertia_world() * w));
            state.linear_velocity += wrench.force * (body.inverse_mass() * dt);
            state.angular_velocity +=
                body.inverse_inertia_world() * (wrench.torque - gyroscopic) * dt;
            state
        })
        .collect()
}

/// Semi-implicit Euler position update from the already corrected velocities.
pub fn integrate_positions(bodies: &[Body], states: &mut [BodyState], dt: f64) {
    for (body, state) in bodies.iter().zip(states.iter_mut()) {
        if body.is_fixed() {
            continue;
        }
        state.position += state.linear_velocity * dt;
        let rotation = state.angular_velocity * dt;
        rotate(state, &rotation);
    }
}

/// Applies a small world-frame rotation vector to the orientation.
pub(crate) fn rotate(state: &mut BodyState, rotation: &Vector3<f64>) {
    if *rotation != Vector3::zeros() {
        let q = UnitQuaternion::from_scaled_axis(*rotation) * state.orientation;
        state.orientation = UnitQuaternion::new_normalize(q.into_inner());
    }
}
