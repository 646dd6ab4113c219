use super::scene::{EntityId, Vec2};

/// Axis-aligned query box, inclusive on its edges.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RangeBox {
    pub center: Vec2,
    pub half_extent: f32,
}

impl RangeBox {
    pub fn around(center: Vec2, half_extent: f32) -> Self {
        Self {
            center,
            half_extent,
        }
    }

    pub fn contains(&self, point: Vec2) -> bool {
        (point.x - self.center.x).abs() <= self.half_extent
            && (point.y - self.center.y).abs() <= self.half_extent
    }
}

/// Nearest candidate inside the box, measured by squared distance to the box
/// center. Ties resolve to the lowest id so scans are deterministic.
pub fn nearest_in_box(
    range: RangeBox,
    candidates: impl IntoIterator<Item = (EntityId, Vec2)>,
) -> Option<(EntityId, f32)> {
    let mut best: Option<(EntityId, f32)> = None;
    for (id, position) in candidates {
        if !range.contains(position) {
            continue;
        }
        let dx = position.x - range.center.x;
        let dy = position.y - range.center.y;
        let distance_sq = dx * dx + dy * dy;
        let closer = match best {
            None => true,
            Some((best_id, best_sq)) => {
                distance_sq < best_sq || (distance_sq == best_sq && id < best_id)
            }
        };
        if closer {
            best = Some((id, distance_sq));
        }
    }
    best
}
