use super::ActionExecutionResult;
use crate::world::{PlayerState, World};
use crate::WALK_SPEED;
use serde_json::json;

/// Seconds of movement used to project the destination of a move
const MOVE_LOOKAHEAD: f32 = 0.1;
const MIN_JUMP_STRENGTH: f32 = 0.1;
const MAX_JUMP_STRENGTH: f32 = 2.0;
/// Pixels per second of upward velocity per unit of jump strength
const JUMP_VELOCITY_SCALE: f32 = 100.0;

fn within_bounds(x: f32, y: f32, world: &dyn World) -> bool {
    let bound = world.pixel_bounds();
    x.abs() <= bound && y.abs() <= bound
}

pub(super) fn validate_move(
    velocity_x: f32,
    velocity_y: f32,
    world: &dyn World,
    player: &PlayerState,
) -> ActionExecutionResult {
    if !velocity_x.is_finite() || !velocity_y.is_finite() {
        return ActionExecutionResult::invalid("Invalid velocity");
    }

    let speed = (velocity_x * velocity_x + velocity_y * velocity_y).sqrt();
    if speed > WALK_SPEED * 2.0 {
        return ActionExecutionResult::invalid("Movement speed too high");
    }

    let next_x = player.x + velocity_x * MOVE_LOOKAHEAD;
    let next_y = player.y + velocity_y * MOVE_LOOKAHEAD;
    if !within_bounds(next_x, next_y, world) {
        return ActionExecutionResult::invalid("Movement would go out of bounds");
    }

    ActionExecutionResult::success("Movement validated")
}

pub(super) fn execute_move(
    direction: &str,
    velocity_x: f32,
    velocity_y: f32,
    player: &mut PlayerState,
) -> ActionExecutionResult {
    player.vel_x = velocity_x;
    player.vel_y = velocity_y;
    player.direction = direction.to_string();

    ActionExecutionResult::success("Player moved").with_data(json!({
        "new_velocity": [velocity_x, velocity_y],
        "direction": direction,
    }))
}

pub(super) fn execute_stop(player: &mut PlayerState) -> ActionExecutionResult {
    player.vel_x = 0.0;
    player.vel_y = 0.0;

    ActionExecutionResult::success("Player stopped").with_data(json!({
        "position": [player.x, player.y],
    }))
}

pub(super) fn validate_jump(jump_strength: f32, player: &PlayerState) -> ActionExecutionResult {
    if !(MIN_JUMP_STRENGTH..=MAX_JUMP_STRENGTH).contains(&jump_strength) {
        return ActionExecutionResult::invalid("Invalid jump strength");
    }
    if !player.on_ground {
        return ActionExecutionResult::invalid("Player is not on the ground");
    }
    ActionExecutionResult::success("Jump validated")
}

pub(super) fn execute_jump(jump_strength: f32, player: &mut PlayerState) -> ActionExecutionResult {
    player.vel_y = -jump_strength * JUMP_VELOCITY_SCALE;
    player.on_ground = false;

    ActionExecutionResult::success("Player jumped").with_data(json!({
        "jump_strength": jump_strength,
        "velocity_y": player.vel_y,
    }))
}

pub(super) fn validate_teleport(
    target_x: f32,
    target_y: f32,
    world: &dyn World,
    player: &PlayerState,
) -> ActionExecutionResult {
    if !player.is_admin {
        return ActionExecutionResult::unauthorized("Teleport requires admin privileges");
    }
    if !target_x.is_finite() || !target_y.is_finite() || !within_bounds(target_x, target_y, world)
    {
        return ActionExecutionResult::invalid("Teleport target out of bounds");
    }
    ActionExecutionResult::success("Teleport validated")
}

pub(super) fn execute_teleport(
    target_x: f32,
    target_y: f32,
    player: &mut PlayerState,
) -> ActionExecutionResult {
    let old_position = [player.x, player.y];
    player.set_position(target_x, target_y);
    player.vel_x = 0.0;
    player.vel_y = 0.0;

    ActionExecutionResult::success("Player teleported").with_data(json!({
        "old_position": old_position,
        "new_position": [target_x, target_y],
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::{Action, ActionKind, ActionResult};
    use crate::world::MemoryWorld;
    use assert_approx_eq::assert_approx_eq;

    fn move_action(vx: f32, vy: f32) -> Action {
        Action::new(
            "p1",
            ActionKind::Move {
                direction: "right".to_string(),
                velocity_x: vx,
                velocity_y: vy,
            },
        )
    }

    #[test]
    fn test_move_speed_limit() {
        let world = MemoryWorld::new();
        let player = PlayerState::new("p1", 0.0, 0.0);

        assert!(move_action(600.0, 0.0).validate(&world, &player).is_success());

        let result = move_action(500.0, 400.0).validate(&world, &player);
        assert_eq!(result.result, ActionResult::Invalid);
        assert_eq!(result.message, "Movement speed too high");
    }

    #[test]
    fn test_move_out_of_bounds() {
        let world = MemoryWorld::with_size(10);
        let player = PlayerState::new("p1", 319.0, 0.0);

        let result = move_action(100.0, 0.0).validate(&world, &player);
        assert_eq!(result.result, ActionResult::Invalid);

        let result = move_action(-100.0, 0.0).validate(&world, &player);
        assert!(result.is_success());
    }

    #[test]
    fn test_move_execute_sets_velocity() {
        let mut world = MemoryWorld::new();
        let mut player = PlayerState::new("p1", 0.0, 0.0);

        let result = move_action(120.0, -30.0)
            .execute(&mut world, &mut player)
            .unwrap();
        assert!(result.is_success());
        assert_approx_eq!(player.vel_x, 120.0);
        assert_approx_eq!(player.vel_y, -30.0);
        assert_eq!(player.direction, "right");

        let stop = Action::new("p1", ActionKind::Stop);
        stop.execute(&mut world, &mut player).unwrap();
        assert_eq!(player.vel_x, 0.0);
        assert_eq!(player.vel_y, 0.0);
    }

    #[test]
    fn test_jump_rules() {
        let mut world = MemoryWorld::new();
        let mut player = PlayerState::new("p1", 0.0, 0.0);

        let weak = Action::new("p1", ActionKind::Jump { jump_strength: 0.05 });
        assert_eq!(weak.validate(&world, &player).result, ActionResult::Invalid);

        let jump = Action::new("p1", ActionKind::Jump { jump_strength: 1.5 });
        assert!(jump.validate(&world, &player).is_success());

        jump.execute(&mut world, &mut player).unwrap();
        assert_approx_eq!(player.vel_y, -150.0);
        assert!(!player.on_ground);
        assert_eq!(jump.validate(&world, &player).result, ActionResult::Invalid);
    }

    #[test]
    fn test_teleport_requires_admin() {
        let mut world = MemoryWorld::new();
        let mut player = PlayerState::new("p1", 0.0, 0.0);
        let teleport = Action::new(
            "p1",
            ActionKind::Teleport {
                target_x: 500.0,
                target_y: 250.0,
            },
        );

        assert_eq!(
            teleport.validate(&world, &player).result,
            ActionResult::Unauthorized
        );

        player.is_admin = true;
        assert!(teleport.validate(&world, &player).is_success());
        teleport.execute(&mut world, &mut player).unwrap();
        assert_approx_eq!(player.x, 500.0);
        assert_approx_eq!(player.y, 250.0);

        let far = Action::new(
            "p1",
            ActionKind::Teleport {
                target_x: 1.0e7,
                target_y: 0.0,
            },
        );
        assert_eq!(far.validate(&world, &player).result, ActionResult::Invalid);
    }
}
