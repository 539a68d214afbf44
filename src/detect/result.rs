/// Axis-aligned box in integer pixel coordinates, `x1 < x2` and `y1 < y2`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BoundingBox {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl BoundingBox {
    /// Build a box; `None` when the corners are not strictly ordered.
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Option<Self> {
        if x1 < x2 && y1 < y2 {
            Some(Self { x1, y1, x2, y2 })
        } else {
            None
        }
    }

    /// Build from floating detector output, truncating toward zero.
    pub fn from_f32(x1: f32, y1: f32, x2: f32, y2: f32) -> Option<Self> {
        if ![x1, y1, x2, y2].iter().all(|v| v.is_finite()) {
            return None;
        }
        Self::new(x1 as i32, y1 as i32, x2 as i32, y2 as i32)
    }

    pub fn width(&self) -> i64 {
        self.x2 as i64 - self.x1 as i64
    }

    pub fn height(&self) -> i64 {
        self.y2 as i64 - self.y1 as i64
    }

    /// Area in square pixels.
    pub fn area(&self) -> i64 {
        self.width() * self.height()
    }

    /// Center in pixel coordinates.
    pub fn center(&self) -> (f64, f64) {
        (
            (self.x1 as f64 + self.x2 as f64) / 2.0,
            (self.y1 as f64 + self.y2 as f64) / 2.0,
        )
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct DetectedObject {
    pub label: String,
    pub bbox: BoundingBox,
    /// Detector confidence in `[0, 1]`.
    pub confidence: f32,
}

impl DetectedObject {
    pub fn new(label: impl Into<String>, bbox: BoundingBox, confidence: f32) -> Self {
        Self {
            label: label.into(),
            bbox,
            confidence,
        }
    }
}

/// Detections for one frame, in detector output order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DetectionResult {
    /// Sequence number of the frame the detections came from (0 if unknown).
    pub frame_sequence: u64,
    pub objects: Vec<DetectedObject>,
}

impl DetectionResult {
    pub fn new(objects: Vec<DetectedObject>) -> Self {
        Self {
            frame_sequence: 0,
            objects,
        }
    }

    /// Result standing in for a failed detection.
    pub fn empty_for(frame_sequence: u64) -> Self {
        Self {
            frame_sequence,
            objects: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DetectedObject> {
        self.objects.iter()
    }
}
