/// Moves `current` toward `target` by at most `max_step`, stopping
/// `stop_distance` short of it. Returns the new position and whether it arrived.
fn step_toward(current: Vec3, target: Vec3, max_step: f32, stop_distance: f32) -> (Vec3, bool) {
    let offset = target - current;
    let distance = offset.length();
    let remaining = distance - stop_distance;
    if remaining <= MOVE_ARRIVAL_THRESHOLD {
        return (current, true);
    }
    if max_step >= remaining {
        return (current + offset / distance * remaining, true);
    }
    (current + offset / distance * max_step, false)
}

/// Deterministic point on a horizontal ring around `anchor`. Each slot starts
/// at its own angle and every relocation rotates by a quarter turn.
fn ring_position(anchor: Vec3, radius: f32, slot: usize, relocation: u32) -> Vec3 {
    let angle = slot as f32 * std::f32::consts::TAU / 6.0
        + relocation as f32 * std::f32::consts::FRAC_PI_2;
    anchor + Vec3::new(angle.cos() * radius, 0.0, angle.sin() * radius)
}

fn viewpoint_pose_for(player: Pose, offset: Vec3) -> Pose {
    Pose::new(player.position + offset, player.orientation)
}
