//! Stateful per-frame gesture classification

use serde::Serialize;
use serde_json::{Map, Value, json};
use std::time::{Duration, Instant};

use super::landmarks::HandLandmarks;
use super::smoother::PointerSmoother;
use crate::config::GestureConfig;

const CLICK_DEBOUNCE: Duration = Duration::from_millis(150);
const RIGHT_CLICK_DEBOUNCE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

/// Classified output for one camera frame
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GestureFrame {
    pub pointer: Option<Point>,
    pub confidence: f32,
    pub hand_present: bool,
    pub click: bool,
    pub right_click: bool,
    /// Only ever set together with `click`
    pub double_click: bool,
    pub drag: bool,
    pub scroll_delta: i32,
    pub raw: Map<String, Value>,
}

impl GestureFrame {
    pub fn absent() -> Self {
        Self::default()
    }
}

pub struct GestureInterpreter {
    config: GestureConfig,
    smoother: PointerSmoother,
    last_click: Option<Instant>,
    last_right_click: Option<Instant>,
    fist_since: Option<Instant>,
}

impl GestureInterpreter {
    pub fn new(config: GestureConfig) -> Self {
        Self {
            smoother: PointerSmoother::new(config.smoothing_alpha, config.deadzone_px),
            config,
            last_click: None,
            last_right_click: None,
            fist_since: None,
        }
    }

    pub fn process(
        &mut self,
        hand: Option<&HandLandmarks>,
        screen: (u32, u32),
        mirrored: bool,
    ) -> GestureFrame {
        self.process_at(hand, screen, mirrored, Instant::now())
    }

    /// Classify one frame observed at `now`
    #[hotpath::measure]
    pub fn process_at(
        &mut self,
        hand: Option<&HandLandmarks>,
        screen: (u32, u32),
        mirrored: bool,
        now: Instant,
    ) -> GestureFrame {
        let Some(hand) = hand else {
            // Debounce timers and the smoother keep their state so the pointer
            // resumes where it left off
            self.fist_since = None;
            return GestureFrame::absent();
        };

        let (px, py) = self.map_pointer(hand, screen, mirrored);
        let mut frame = GestureFrame {
            pointer: Some(Point { x: px, y: py }),
            confidence: 1.0,
            hand_present: true,
            ..GestureFrame::default()
        };

        let click_distance = hand.index_tip.distance(&hand.thumb_tip);
        let right_click_distance = hand.middle_tip.distance(&hand.thumb_tip);

        if click_distance < self.config.click_distance_threshold
            && elapsed_at_least(self.last_click, now, CLICK_DEBOUNCE)
        {
            frame.click = true;
            let cooldown = self.config.double_click_cooldown();
            frame.double_click = self
                .last_click
                .is_some_and(|last| now.saturating_duration_since(last) < cooldown);
            self.last_click = Some(now);
        }

        if right_click_distance < self.config.right_click_distance_threshold
            && elapsed_at_least(self.last_right_click, now, RIGHT_CLICK_DEBOUNCE)
        {
            frame.right_click = true;
            self.last_right_click = Some(now);
        }

        let fist = hand.is_fist();
        if fist {
            let since = *self.fist_since.get_or_insert(now);
            let hold = self.config.drag_hold_threshold();
            frame.drag = now.saturating_duration_since(since) >= hold;
        } else {
            self.fist_since = None;
        }

        let vertical = hand.index_tip.y - hand.wrist.y;
        frame.scroll_delta = self.scroll_for(vertical);

        frame.raw.insert("click_distance".into(), json!(click_distance));
        frame.raw.insert("right_click_distance".into(), json!(right_click_distance));
        frame.raw.insert("fist".into(), json!(fist));
        frame.raw.insert("vertical".into(), json!(vertical));
        frame
    }

    fn map_pointer(&mut self, hand: &HandLandmarks, screen: (u32, u32), mirrored: bool) -> (i32, i32) {
        let (w, h) = (screen.0 as f32, screen.1 as f32);
        let mut x = hand.index_tip.x * w;
        let y = hand.index_tip.y * h;
        if mirrored {
            x = w - x;
        }
        self.smoother.apply(x, y)
    }

    /// Fingertip above the wrist scrolls up (positive), below scrolls down
    fn scroll_for(&self, vertical: f32) -> i32 {
        let step = self.config.scroll_step;
        if vertical < -self.config.fast_scroll_threshold {
            step * 2
        } else if vertical < -self.config.scroll_threshold {
            step
        } else if vertical > self.config.fast_scroll_threshold {
            -step * 2
        } else if vertical > self.config.scroll_threshold {
            -step
        } else {
            0
        }
    }
}

fn elapsed_at_least(last: Option<Instant>, now: Instant, min: Duration) -> bool {
    last.is_none_or(|last| now.saturating_duration_since(last) >= min)
}
