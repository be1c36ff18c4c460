//! The per-tick movement and decollision solve.
//!
//! One call per character per fixed tick, strictly sequenced: parent carry,
//! initial overlaps, ground probing, slope-change guard, ground pushing,
//! the bounded sweep loop, overlap decollision, platform detection, stateful
//! hit diffing. The collision world is read-only throughout; the only writes
//! are to the character's own state and its private impulse queue.

use rapier3d::math::{Isometry, Real, Translation, Vector};

use sim_core::logging;

use crate::body::CharacterBody;
use crate::grounding::{self, GroundingEvaluationKind, StepHandlingMode};
use crate::hits::{BasicHit, CharacterHit, VelocityProjectionHit};
use crate::impulses;
use crate::math;
use crate::parent;
use crate::processor::{CharacterProcessor, ProcessorContext};

/// Remaining displacement below this is considered consumed.
const MOVEMENT_EPSILON: Real = 1.0e-4;
/// Penetration depth below this is left to the contact offset.
const DEPTH_EPSILON: Real = 1.0e-4;

/// Runs one fixed tick for one character. `pose` and `body` are the previous
/// tick's outputs; both are updated in place.
pub fn update_character<P: CharacterProcessor>(
    processor: &mut P,
    ctx: &ProcessorContext<'_, '_>,
    pose: &mut Isometry<Real>,
    body: &mut CharacterBody,
) {
    let mut projection_hits: Vec<VelocityProjectionHit> = Vec::new();

    initialize_update(body, ctx.dt);
    processor.update_grounding_up(ctx, body, &pose.rotation);

    parent::apply_parent_movement(ctx.query, body, pose, ctx.dt);

    if ctx.props.decollide_from_overlaps {
        resolve_initial_overlaps(processor, ctx, pose, body, &mut projection_hits);
    }

    if ctx.props.evaluate_grounding && !body.is_grounded {
        let moving_up = body.relative_velocity.dot(&body.grounding_up) > 1.0e-2;
        if !moving_up {
            probe_ground(processor, ctx, pose, body);
        }
    }

    if body.is_grounded && ctx.props.step_and_slope.prevent_grounding_from_future_slope_change {
        apply_future_slope_guard(ctx, pose, body);
    }

    if body.is_grounded && ctx.props.simulate_dynamic_body {
        queue_ground_push(ctx, body);
    }

    if ctx.props.detect_movement_collisions {
        move_with_collisions(processor, ctx, pose, body, &mut projection_hits);
    } else {
        pose.translation.vector += body.relative_velocity * ctx.dt;
    }

    if ctx.props.decollide_from_overlaps {
        decollide_from_overlaps(processor, ctx, pose, body, &mut projection_hits);
    }

    parent::detect_moving_platform(ctx.query, body, pose);

    if ctx.props.process_stateful_hits {
        process_stateful_hits(body);
    }
}

fn initialize_update(body: &mut CharacterBody, dt: Real) {
    body.was_grounded_before_update = body.is_grounded;
    body.is_grounded = false;
    body.ground_hit = None;
    body.parent_changed = false;
    body.hits.clear();
    body.deferred_impulses.clear();
    body.stateful_hits.clear();
    body.last_physics_update_dt = dt;
    if !math::is_finite(&body.relative_velocity) {
        logging::warn("non-finite character velocity, resetting to zero");
        body.relative_velocity = Vector::zeros();
    }
}

/// Existing penetrations at the start of the tick: classify, record, push
/// out, and fold into the projection state so the character stops driving
/// into whatever it spawned or was shoved inside.
fn resolve_initial_overlaps<P: CharacterProcessor>(
    processor: &mut P,
    ctx: &ProcessorContext<'_, '_>,
    pose: &mut Isometry<Real>,
    body: &mut CharacterBody,
    projection_hits: &mut Vec<VelocityProjectionHit>,
) {
    let capsule = ctx.shape.to_capsule();
    let overlaps = ctx.query.overlaps(&capsule, pose, ctx.props.contact_offset);
    for overlap in &overlaps {
        if overlap.depth <= DEPTH_EPSILON {
            continue;
        }
        let basic = BasicHit::from_overlap(overlap);
        if !processor.can_collide_with_hit(ctx, &basic) {
            continue;
        }
        let grounded_on_hit =
            processor.is_grounded_on_hit(ctx, body, &basic, GroundingEvaluationKind::InitialOverlaps);
        push_out_of_overlap(body, pose, &basic, overlap.depth, grounded_on_hit, ctx);
        record_overlap_hit(processor, ctx, body, &basic, grounded_on_hit, projection_hits);
    }
}

fn probe_ground<P: CharacterProcessor>(
    processor: &mut P,
    ctx: &ProcessorContext<'_, '_>,
    pose: &mut Isometry<Real>,
    body: &mut CharacterBody,
) {
    let capsule = ctx.shape.to_capsule();
    let down = -body.grounding_up;
    let offset = ctx.props.contact_offset;
    let probe_distance = ctx.props.ground_snapping_distance.max(offset * 2.0) + offset;
    let Some(sweep) = ctx.query.cast_capsule(&capsule, pose, &down, probe_distance) else {
        return;
    };
    let basic = BasicHit::from_sweep(&sweep);
    if !processor.is_grounded_on_hit(ctx, body, &basic, GroundingEvaluationKind::GroundProbing) {
        return;
    }
    let within_contact = sweep.distance <= offset * 2.0 + 1.0e-4;
    let can_snap = ctx.props.snap_to_ground
        && body.was_grounded_before_update
        && sweep.distance <= ctx.props.ground_snapping_distance + offset;
    if !within_contact && !can_snap {
        return;
    }
    body.is_grounded = true;
    body.ground_hit = Some(basic);
    if can_snap && !within_contact {
        let snap = (sweep.distance - offset).max(0.0);
        pose.translation.vector -= body.grounding_up * snap;
    }
}

/// Suppresses grounding for the tick when the slope ahead drops away more
/// sharply than configured, so the character launches instead of snapping
/// down the far side.
fn apply_future_slope_guard(
    ctx: &ProcessorContext<'_, '_>,
    pose: &Isometry<Real>,
    body: &mut CharacterBody,
) {
    let Some(ground) = body.ground_hit else {
        return;
    };
    let foot =
        rapier3d::prelude::Point::from(pose.translation.vector)
            - body.grounding_up * ctx.shape.bottom_offset();
    if grounding::future_slope_change_exceeds_limit(
        ctx.query,
        ctx.props,
        &body.grounding_up,
        &ground.normal,
        foot,
        &body.relative_velocity,
        ctx.dt,
        ctx.shape.radius,
    ) {
        body.is_grounded = false;
        body.ground_hit = None;
    }
}

/// Transfers the character's weight onto a dynamic ground body as a deferred
/// impulse.
fn queue_ground_push(ctx: &ProcessorContext<'_, '_>, body: &mut CharacterBody) {
    let Some(ground) = body.ground_hit else {
        return;
    };
    let Some(handle) = ground.body else {
        return;
    };
    if ctx.props.mass <= 0.0 {
        return;
    }
    let weight_impulse = ctx.query.gravity() * ctx.props.mass * ctx.dt;
    if let Some(impulse) =
        impulses::impulse_on_body(ctx.query.world(), handle, weight_impulse, ground.point)
    {
        body.deferred_impulses.push(impulse);
    }
}

/// The bounded sweep loop: cast along the remaining displacement, take the
/// earliest hit, step up over low risers, otherwise project and continue
/// with the corrected direction. Tie-break rule: smallest hit fraction wins.
fn move_with_collisions<P: CharacterProcessor>(
    processor: &mut P,
    ctx: &ProcessorContext<'_, '_>,
    pose: &mut Isometry<Real>,
    body: &mut CharacterBody,
    projection_hits: &mut Vec<VelocityProjectionHit>,
) {
    let capsule = ctx.shape.to_capsule();
    let offset = ctx.props.contact_offset;
    let original_velocity_direction = math::normalize_or_zero(&body.relative_velocity);

    let mut direction = original_velocity_direction;
    let mut remaining = body.relative_velocity.norm() * ctx.dt;
    if remaining <= MOVEMENT_EPSILON || direction.norm_squared() <= math::VECTOR_EPSILON_SQ {
        return;
    }

    let mut iterations = 0u32;
    while remaining > MOVEMENT_EPSILON && iterations < ctx.props.max_continuous_collisions_iterations
    {
        iterations += 1;

        let candidates = ctx
            .query
            .cast_capsule_all(&capsule, pose, &direction, remaining + offset);
        let hit = candidates.iter().find_map(|sweep| {
            let basic = BasicHit::from_sweep(sweep);
            processor
                .can_collide_with_hit(ctx, &basic)
                .then_some((*sweep, basic))
        });
        let Some((sweep, basic)) = hit else {
            pose.translation.vector += direction * remaining;
            remaining = 0.0;
            break;
        };

        let advance = (sweep.distance - offset).clamp(0.0, remaining);
        pose.translation.vector += direction * advance;
        remaining = (remaining - advance).max(0.0);

        let step_mode = if ctx.query.step_handling_ignored(basic.collider) {
            StepHandlingMode::DisabledForHit
        } else {
            StepHandlingMode::Enabled
        };
        let grounded_on_hit =
            processor.is_grounded_on_hit(ctx, body, &basic, GroundingEvaluationKind::MovementHit);
        let velocity_before = body.relative_velocity;

        let mut stepped = false;
        if step_mode == StepHandlingMode::Enabled && ctx.props.step_and_slope.handle_steps {
            stepped = try_step_up(processor, ctx, pose, body, &direction, &basic);
        }

        if !stepped {
            if ctx.props.simulate_dynamic_body {
                queue_dynamic_hit_response(processor, ctx, body, &basic);
            }

            projection_hits.push(VelocityProjectionHit::new(&basic, grounded_on_hit));

            let mut is_grounded = body.is_grounded;
            let mut ground_hit_p = body
                .ground_hit
                .map(|ground| VelocityProjectionHit::new(&ground, true));
            let mut velocity = body.relative_velocity;
            processor.project_velocity_on_hits(
                ctx,
                &mut velocity,
                &mut is_grounded,
                &mut ground_hit_p,
                projection_hits,
                &original_velocity_direction,
                &body.grounding_up,
            );
            body.relative_velocity = velocity;
            if ctx.props.evaluate_grounding {
                body.is_grounded = is_grounded;
                if grounded_on_hit {
                    body.ground_hit = Some(basic);
                }
            }

            // The remaining displacement obeys the same constraint set; a
            // stale direction must never leak into the next iteration.
            let mut remaining_vec = direction * remaining;
            let mut scratch_grounded = is_grounded;
            let mut scratch_ground = ground_hit_p;
            processor.project_velocity_on_hits(
                ctx,
                &mut remaining_vec,
                &mut scratch_grounded,
                &mut scratch_ground,
                projection_hits,
                &original_velocity_direction,
                &body.grounding_up,
            );
            remaining = remaining_vec.norm();
            direction = math::normalize_or_zero(&remaining_vec);
            if direction.norm_squared() <= math::VECTOR_EPSILON_SQ {
                remaining = 0.0;
            }
        }

        let record = CharacterHit {
            hit: basic,
            was_character_grounded: body.was_grounded_before_update,
            grounded_on_hit,
            velocity_before,
            velocity_after: body.relative_velocity,
        };
        body.hits.push(record);
        processor.on_movement_hit(ctx, body, &record);
    }

    if remaining > MOVEMENT_EPSILON {
        logging::debug(format!(
            "movement iterations exhausted with {:.4} remaining",
            remaining
        ));
        if !ctx.props.discard_movement_when_exceed_max_iterations {
            pose.translation.vector += direction * remaining;
        }
        if ctx.props.kill_velocity_when_exceed_max_iterations {
            body.relative_velocity = Vector::zeros();
        }
    }
}

/// Attempts to lift the character over a low riser instead of stopping at
/// it: the capsule must have head room, forward clearance at the raised
/// height, and a walkable surface under the probe capsule on the far side.
/// Consumes no horizontal movement; the next sweep iteration continues.
fn try_step_up<P: CharacterProcessor>(
    processor: &mut P,
    ctx: &ProcessorContext<'_, '_>,
    pose: &mut Isometry<Real>,
    body: &mut CharacterBody,
    direction: &Vector<Real>,
    blocking: &BasicHit,
) -> bool {
    let params = &ctx.props.step_and_slope;
    if params.max_step_height <= 0.0 {
        return false;
    }
    let up = body.grounding_up;
    let offset = ctx.props.contact_offset;
    let capsule = ctx.shape.to_capsule();

    let horizontal = math::normalize_or_zero(&math::project_on_plane(direction, &up));
    if horizontal.norm_squared() <= math::VECTOR_EPSILON_SQ {
        return false;
    }

    // The contact must be a riser: above the feet, below the step limit, and
    // actually obstructing horizontal progress. Flat-ground and ramp
    // contacts sit at the feet and fall through to normal projection.
    let bottom = pose.translation.vector - up * ctx.shape.bottom_offset();
    let riser_height = (blocking.point.coords - bottom).dot(&up);
    if riser_height <= offset * 2.0 || riser_height > params.max_step_height + offset {
        return false;
    }
    let lateral_normal = math::project_on_plane(&blocking.normal, &up);
    if lateral_normal.dot(&horizontal) >= -1.0e-2 {
        return false;
    }

    // Head room.
    let rise = match ctx
        .query
        .cast_capsule(&capsule, pose, &up, params.max_step_height + offset)
    {
        Some(ceiling) => (ceiling.distance - offset).clamp(0.0, params.max_step_height),
        None => params.max_step_height,
    };
    if rise <= DEPTH_EPSILON {
        return false;
    }
    let raised = Translation::from(up * rise) * *pose;

    // Forward clearance on the step.
    let forward_clearance = params.character_width_for_step_grounding_check.max(offset * 2.0);
    if ctx
        .query
        .cast_capsule(&capsule, &raised, &horizontal, forward_clearance + offset)
        .is_some()
    {
        return false;
    }
    let forwarded = Translation::from(horizontal * forward_clearance) * raised;

    // The step top must be walkable for the narrowed probe capsule.
    let probe = ctx
        .shape
        .step_probe_capsule(params.character_width_for_step_grounding_check);
    let Some(down) = ctx
        .query
        .cast_capsule(&probe, &forwarded, &(-up), rise + offset)
    else {
        return false;
    };
    let step_basic = BasicHit::from_sweep(&down);
    if ctx.query.step_handling_ignored(step_basic.collider) {
        return false;
    }
    if !processor.is_grounded_on_hit(ctx, body, &step_basic, GroundingEvaluationKind::StepUpHit) {
        return false;
    }

    let step_height = rise - (down.distance - offset).max(0.0);
    if step_height <= DEPTH_EPSILON || step_height > params.max_step_height + offset {
        return false;
    }
    pose.translation.vector += up * step_height;
    if ctx.props.evaluate_grounding {
        body.is_grounded = true;
        body.ground_hit = Some(step_basic);
    }
    true
}

/// Iterative decollision: push the character out of residual overlaps along
/// each separating axis, re-checking after every pass. Terminates early once
/// nothing overlaps.
fn decollide_from_overlaps<P: CharacterProcessor>(
    processor: &mut P,
    ctx: &ProcessorContext<'_, '_>,
    pose: &mut Isometry<Real>,
    body: &mut CharacterBody,
    projection_hits: &mut Vec<VelocityProjectionHit>,
) {
    let capsule = ctx.shape.to_capsule();
    for _ in 0..ctx.props.max_overlap_decollision_iterations {
        let mut overlaps = ctx.query.overlaps(&capsule, pose, ctx.props.contact_offset);
        overlaps.retain(|overlap| overlap.depth > DEPTH_EPSILON);
        if overlaps.is_empty() {
            break;
        }
        // Shallowest separating axis first.
        overlaps.sort_by(|a, b| a.depth.total_cmp(&b.depth));
        for overlap in &overlaps {
            let basic = BasicHit::from_overlap(overlap);
            if !processor.can_collide_with_hit(ctx, &basic) {
                continue;
            }
            let grounded_on_hit = processor.is_grounded_on_hit(
                ctx,
                body,
                &basic,
                GroundingEvaluationKind::OverlapDecollision,
            );
            push_out_of_overlap(body, pose, &basic, overlap.depth, grounded_on_hit, ctx);
            record_overlap_hit(processor, ctx, body, &basic, grounded_on_hit, projection_hits);
        }
    }
}

/// Displaces the character out of one overlap. Ground overlaps decollide
/// along the grounding up so slopes do not squeeze the character sideways.
fn push_out_of_overlap(
    body: &mut CharacterBody,
    pose: &mut Isometry<Real>,
    hit: &BasicHit,
    depth: Real,
    grounded_on_hit: bool,
    ctx: &ProcessorContext<'_, '_>,
) {
    let mut dir = hit.normal;
    let mut distance = depth;
    if grounded_on_hit {
        let along_up = body.grounding_up.dot(&hit.normal);
        if along_up > 0.1 {
            dir = body.grounding_up;
            distance = depth / along_up;
        }
    }
    pose.translation.vector += dir * distance;
    if grounded_on_hit && ctx.props.evaluate_grounding {
        body.is_grounded = true;
        body.ground_hit = Some(*hit);
    }
}

fn record_overlap_hit<P: CharacterProcessor>(
    processor: &mut P,
    ctx: &ProcessorContext<'_, '_>,
    body: &mut CharacterBody,
    basic: &BasicHit,
    grounded_on_hit: bool,
    projection_hits: &mut Vec<VelocityProjectionHit>,
) {
    let velocity_before = body.relative_velocity;
    if body.relative_velocity.dot(&basic.normal) < 0.0 {
        projection_hits.push(VelocityProjectionHit::new(basic, grounded_on_hit));
        let mut is_grounded = body.is_grounded;
        let mut ground_hit_p = body
            .ground_hit
            .map(|ground| VelocityProjectionHit::new(&ground, true));
        let mut velocity = body.relative_velocity;
        let original = math::normalize_or_zero(&velocity_before);
        processor.project_velocity_on_hits(
            ctx,
            &mut velocity,
            &mut is_grounded,
            &mut ground_hit_p,
            projection_hits,
            &original,
            &body.grounding_up,
        );
        body.relative_velocity = velocity;
        if ctx.props.evaluate_grounding {
            body.is_grounded = is_grounded;
        }
    }
    body.hits.push(CharacterHit {
        hit: *basic,
        was_character_grounded: body.was_grounded_before_update,
        grounded_on_hit,
        velocity_before,
        velocity_after: body.relative_velocity,
    });
}

/// Momentum exchange with a dynamic body or another character, evaluated
/// against the pre-projection velocity. Other characters are read from their
/// previous-tick snapshots, never live state.
fn queue_dynamic_hit_response<P: CharacterProcessor>(
    processor: &mut P,
    ctx: &ProcessorContext<'_, '_>,
    body: &mut CharacterBody,
    basic: &BasicHit,
) {
    let Some(handle) = basic.body else {
        return;
    };
    let normal = basic.normal;

    if basic.tags.contains(character_query::CollisionTags::CHARACTER_BODY) {
        let Some(stored) = ctx.characters.get(&handle) else {
            return;
        };
        let mut self_mass = ctx.props.mass;
        let mut other_mass = stored.mass;
        processor.override_dynamic_hit_masses(ctx, basic, &mut self_mass, &mut other_mass);
        if self_mass <= 0.0 || other_mass <= 0.0 {
            return;
        }
        let approach = (body.relative_velocity - stored.relative_velocity).dot(&normal);
        if approach >= 0.0 {
            return;
        }
        let share = other_mass / (self_mass + other_mass);
        body.relative_velocity -= normal * (approach * share);
        return;
    }

    let Some(rb) = ctx.query.world().body(handle) else {
        return;
    };
    if !rb.is_dynamic() {
        return;
    }
    let mut self_mass = ctx.props.mass;
    let mut other_mass = rb.mass();
    processor.override_dynamic_hit_masses(ctx, basic, &mut self_mass, &mut other_mass);
    if let Some(queued) = impulses::solve_collision_impulses(
        ctx.query.world(),
        handle,
        basic.point,
        normal,
        body.world_velocity(),
        self_mass,
        other_mass,
    ) {
        body.deferred_impulses.push(queued);
    }
}

/// Diffs this tick's contact set against last tick's, keyed by
/// body+collider.
fn process_stateful_hits(body: &mut CharacterBody) {
    let mut current: Vec<crate::hits::HitKey> = Vec::new();
    for hit in &body.hits {
        let key = hit.hit.key();
        if !current.contains(&key) {
            current.push(key);
        }
    }
    let mut stateful = std::mem::take(&mut body.stateful_hits);
    crate::hits::diff_stateful_hits(&body.previous_hit_keys, &current, &mut stateful);
    body.stateful_hits = stateful;
    body.previous_hit_keys = current;
}
