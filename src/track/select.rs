use crate::detect::{DetectedObject, DetectionResult};

/// Picks the object to follow out of one detection result.
///
/// Objects are filtered by label (and by confidence when a floor is set); of the
/// survivors the largest box wins. On equal area the earlier object wins.
#[derive(Clone, Debug)]
pub struct TargetSelector {
    label: String,
    min_confidence: Option<f32>,
}

impl TargetSelector {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            min_confidence: None,
        }
    }

    pub fn with_min_confidence(mut self, min_confidence: f32) -> Self {
        self.min_confidence = Some(min_confidence);
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn select<'a>(&self, result: &'a DetectionResult) -> Option<&'a DetectedObject> {
        let mut best: Option<&DetectedObject> = None;
        for object in result.iter() {
            if object.label != self.label {
                continue;
            }
            if self.min_confidence.is_some_and(|min| object.confidence < min) {
                continue;
            }
            match best {
                Some(current) if object.bbox.area() <= current.bbox.area() => {}
                _ => best = Some(object),
            }
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::BoundingBox;

    fn object(label: &str, x1: i32, y1: i32, x2: i32, y2: i32, confidence: f32) -> DetectedObject {
        DetectedObject::new(label, BoundingBox::new(x1, y1, x2, y2).unwrap(), confidence)
    }

    #[test]
    fn picks_largest_matching_box() {
        let result = DetectionResult::new(vec![
            object("cup", 0, 0, 10, 10, 0.9),
            object("person", 0, 0, 300, 300, 0.99),
            object("cup", 50, 50, 90, 90, 0.5),
        ]);
        let selected = TargetSelector::new("cup").select(&result).unwrap();
        assert_eq!(selected.bbox.area(), 1600);
    }

    #[test]
    fn equal_area_keeps_first() {
        let result = DetectionResult::new(vec![
            object("cup", 0, 0, 20, 10, 0.4),
            object("cup", 100, 100, 110, 120, 0.9),
        ]);
        let selected = TargetSelector::new("cup").select(&result).unwrap();
        assert_eq!(selected.bbox.x1, 0);
    }

    #[test]
    fn confidence_floor_filters_candidates() {
        let result = DetectionResult::new(vec![
            object("cup", 0, 0, 100, 100, 0.2),
            object("cup", 0, 0, 10, 10, 0.8),
        ]);
        let selected = TargetSelector::new("cup")
            .with_min_confidence(0.4)
            .select(&result)
            .unwrap();
        assert_eq!(selected.bbox.area(), 100);
    }

    #[test]
    fn no_match_is_none() {
        let result = DetectionResult::new(vec![object("person", 0, 0, 10, 10, 0.9)]);
        assert!(TargetSelector::new("cup").select(&result).is_none());
        assert!(TargetSelector::new("cup").select(&DetectionResult::default()).is_none());
    }
}
