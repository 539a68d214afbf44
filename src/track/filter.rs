use crate::error::{TrackerError, TrackerResult};

/// Pixel offset from the frame center (+x right, +y down).
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PixelOffset {
    pub dx: f64,
    pub dy: f64,
}

impl PixelOffset {
    pub const fn new(dx: f64, dy: f64) -> Self {
        Self { dx, dy }
    }
}

/// Smoothed target position. Written only through `PositionFilter::apply`.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TrackState {
    pub smoothed_cx: f64,
    pub smoothed_cy: f64,
    pub initialized: bool,
}

impl TrackState {
    pub fn smoothed(&self) -> Option<PixelOffset> {
        self.initialized
            .then(|| PixelOffset::new(self.smoothed_cx, self.smoothed_cy))
    }
}

/// Exponential moving average over the selected target's center.
///
/// `smoothed = alpha * previous + (1 - alpha) * raw`. The first observation is
/// taken as-is. Cycles without a candidate do not touch the state, so a target
/// that reappears resumes from where it was last seen.
#[derive(Clone, Copy, Debug)]
pub struct PositionFilter {
    alpha: f64,
}

impl PositionFilter {
    pub fn new(alpha: f64) -> TrackerResult<Self> {
        if !(alpha > 0.0 && alpha < 1.0) {
            return Err(TrackerError::Config(format!(
                "smoothing factor must lie in (0, 1), got {}",
                alpha
            )));
        }
        Ok(Self { alpha })
    }

    /// Fold one raw observation into `state` and return the smoothed center.
    ///
    /// Non-finite observations are ignored so the state stays finite.
    pub fn apply(&self, state: &mut TrackState, raw: PixelOffset) -> PixelOffset {
        if !raw.dx.is_finite() || !raw.dy.is_finite() {
            log::debug!("PositionFilter: ignoring non-finite observation {:?}", raw);
            return state.smoothed().unwrap_or(raw);
        }
        if state.initialized {
            state.smoothed_cx = self.alpha * state.smoothed_cx + (1.0 - self.alpha) * raw.dx;
            state.smoothed_cy = self.alpha * state.smoothed_cy + (1.0 - self.alpha) * raw.dy;
        } else {
            state.smoothed_cx = raw.dx;
            state.smoothed_cy = raw.dy;
            state.initialized = true;
        }
        PixelOffset::new(state.smoothed_cx, state.smoothed_cy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_observation_is_taken_verbatim() {
        let filter = PositionFilter::new(0.65).unwrap();
        let mut state = TrackState::default();
        let out = filter.apply(&mut state, PixelOffset::new(-170.0, -90.0));
        assert_eq!(out, PixelOffset::new(-170.0, -90.0));
        assert!(state.initialized);
    }

    #[test]
    fn second_observation_blends() {
        let filter = PositionFilter::new(0.65).unwrap();
        let mut state = TrackState::default();
        filter.apply(&mut state, PixelOffset::new(10.0, -20.0));
        let out = filter.apply(&mut state, PixelOffset::new(30.0, 40.0));
        assert!((out.dx - (0.65 * 10.0 + 0.35 * 30.0)).abs() < 1e-9);
        assert!((out.dy - (0.65 * -20.0 + 0.35 * 40.0)).abs() < 1e-9);
    }

    #[test]
    fn rejects_alpha_outside_open_interval() {
        assert!(PositionFilter::new(0.0).is_err());
        assert!(PositionFilter::new(1.0).is_err());
        assert!(PositionFilter::new(f64::NAN).is_err());
    }

    #[test]
    fn non_finite_observation_leaves_state() {
        let filter = PositionFilter::new(0.5).unwrap();
        let mut state = TrackState::default();
        filter.apply(&mut state, PixelOffset::new(4.0, 8.0));
        let before = state;
        filter.apply(&mut state, PixelOffset::new(f64::INFINITY, 0.0));
        assert_eq!(state, before);
    }
}
