use crate::camera::CameraFrame;
use crate::config::GestureConfig;
use crate::error::Result;

/// Normalized landmark: x and y in 0.0-1.0 of the image, y grows downward
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Landmark {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y, z: 0.0 }
    }

    /// Planar distance, depth ignored
    pub fn distance(&self, other: &Landmark) -> f32 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

/// The ten points of one detected hand the interpreter looks at
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HandLandmarks {
    pub thumb_tip: Landmark,
    pub index_tip: Landmark,
    pub index_pip: Landmark,
    pub middle_tip: Landmark,
    pub middle_pip: Landmark,
    pub ring_tip: Landmark,
    pub ring_pip: Landmark,
    pub pinky_tip: Landmark,
    pub pinky_pip: Landmark,
    pub wrist: Landmark,
}

impl HandLandmarks {
    /// A finger is folded when its tip sits below its proximal joint
    fn folded(tip: &Landmark, pip: &Landmark) -> bool {
        tip.y > pip.y
    }

    /// At least three of the four fingers folded
    pub fn is_fist(&self) -> bool {
        [
            (&self.index_tip, &self.index_pip),
            (&self.middle_tip, &self.middle_pip),
            (&self.ring_tip, &self.ring_pip),
            (&self.pinky_tip, &self.pinky_pip),
        ]
        .iter()
        .filter(|(tip, pip)| Self::folded(tip, pip))
        .count()
            >= 3
    }
}

/// Landmark detector over camera frames, implemented outside this crate
pub trait HandLandmarkAdapter: Send {
    /// Every hand found in the frame, best candidate first
    fn parse(&mut self, frame: &CameraFrame) -> Result<Vec<HandLandmarks>>;
}

/// Builds the detector once authentication has succeeded
pub type HandAdapterFactory =
    Box<dyn Fn(&GestureConfig) -> Result<Box<dyn HandLandmarkAdapter>> + Send + Sync>;

/// Detector that never finds a hand
pub struct NoHands;

impl HandLandmarkAdapter for NoHands {
    fn parse(&mut self, _frame: &CameraFrame) -> Result<Vec<HandLandmarks>> {
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_hand() -> HandLandmarks {
        let tip = |x: f32| Landmark::new(x, 0.4);
        let pip = |x: f32| Landmark::new(x, 0.5);
        HandLandmarks {
            thumb_tip: Landmark::new(0.3, 0.5),
            index_tip: tip(0.4),
            index_pip: pip(0.4),
            middle_tip: tip(0.5),
            middle_pip: pip(0.5),
            ring_tip: tip(0.6),
            ring_pip: pip(0.6),
            pinky_tip: tip(0.7),
            pinky_pip: pip(0.7),
            wrist: Landmark::new(0.5, 0.8),
        }
    }

    #[test]
    fn test_fist_needs_three_folded_fingers() {
        let mut hand = open_hand();
        assert!(!hand.is_fist());

        hand.index_tip.y = 0.6;
        hand.middle_tip.y = 0.6;
        assert!(!hand.is_fist());

        hand.ring_tip.y = 0.6;
        assert!(hand.is_fist());
    }

    #[test]
    fn test_distance() {
        let a = Landmark::new(0.0, 0.0);
        let b = Landmark::new(0.3, 0.4);
        assert!((a.distance(&b) - 0.5).abs() < 1e-6);
    }
}
