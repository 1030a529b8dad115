/// Exponential moving average over screen coordinates with a per-axis deadzone.
///
/// The first sample is taken as-is. After that, an axis delta no larger than
/// the deadzone is treated as zero and the rest is scaled by `alpha` before it
/// is added to the last position.
#[derive(Debug, Clone)]
pub struct PointerSmoother {
    alpha: f32,
    deadzone_px: f32,
    last: Option<(f32, f32)>,
}

impl PointerSmoother {
    pub fn new(alpha: f32, deadzone_px: u32) -> Self {
        Self {
            alpha,
            deadzone_px: deadzone_px as f32,
            last: None,
        }
    }

    pub fn apply(&mut self, x: f32, y: f32) -> (i32, i32) {
        let (last_x, last_y) = match self.last {
            Some(last) => last,
            None => {
                self.last = Some((x, y));
                return (x as i32, y as i32);
            }
        };

        let dx = self.suppress(x - last_x);
        let dy = self.suppress(y - last_y);

        let next = (last_x + dx * self.alpha, last_y + dy * self.alpha);
        self.last = Some(next);
        (next.0 as i32, next.1 as i32)
    }

    fn suppress(&self, delta: f32) -> f32 {
        if delta.abs() <= self.deadzone_px { 0.0 } else { delta }
    }

    pub fn last(&self) -> Option<(f32, f32)> {
        self.last
    }
}
