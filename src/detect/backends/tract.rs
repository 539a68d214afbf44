#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use tract_onnx::prelude::*;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::{BoundingBox, DetectedObject, DetectionResult};
use crate::frame::Frame;

/// COCO class names in model output order.
pub const COCO_CLASSES: [&str; 80] = [
    "person", "bicycle", "car", "motorcycle", "airplane", "bus", "train", "truck", "boat",
    "traffic light", "fire hydrant", "stop sign", "parking meter", "bench", "bird", "cat", "dog",
    "horse", "sheep", "cow", "elephant", "bear", "zebra", "giraffe", "backpack", "umbrella",
    "handbag", "tie", "suitcase", "frisbee", "skis", "snowboard", "sports ball", "kite",
    "baseball bat", "baseball glove", "skateboard", "surfboard", "tennis racket", "bottle",
    "wine glass", "cup", "fork", "knife", "spoon", "bowl", "banana", "apple", "sandwich",
    "orange", "broccoli", "carrot", "hot dog", "pizza", "donut", "cake", "chair", "couch",
    "potted plant", "bed", "dining table", "toilet", "tv", "laptop", "mouse", "remote",
    "keyboard", "cell phone", "microwave", "oven", "toaster", "sink", "refrigerator", "book",
    "clock", "vase", "scissors", "teddy bear", "hair drier", "toothbrush",
];

const NMS_IOU: f32 = 0.45;

/// Tract-based backend for YOLOv8-style ONNX detectors.
///
/// The model takes a square `1x3xSxS` RGB tensor scaled to `0..1` and produces
/// `1x(4+classes)xN`, one column per anchor: `cx, cy, w, h` in input pixels
/// followed by per-class scores. Frames are stretched to the input size and the
/// boxes stretched back.
pub struct TractBackend {
    model: SimplePlan<TypedFact, Box<dyn TypedOp>>,
    input_size: u32,
    confidence_threshold: f32,
}

impl TractBackend {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(model_path: P, input_size: u32) -> Result<Self> {
        let model_path = model_path.as_ref();
        let side = input_size as usize;
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("load ONNX model {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(f32::datum_type(), tvec!(1, 3, side, side)),
            )
            .context("fix ONNX input shape")?
            .into_optimized()
            .context("optimize ONNX graph")?
            .into_runnable()
            .context("make ONNX plan runnable")?;

        Ok(Self {
            model,
            input_size,
            confidence_threshold: 0.4,
        })
    }

    /// Override the default confidence threshold.
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.confidence_threshold = threshold;
        self
    }

    fn build_input(&self, frame: &Frame) -> Tensor {
        let side = self.input_size as usize;
        let (fw, fh) = (frame.width as usize, frame.height as usize);
        let pixels = frame.pixels();
        let input = tract_ndarray::Array4::from_shape_fn((1, 3, side, side), |(_, c, y, x)| {
            let sx = (x * fw / side).min(fw - 1);
            let sy = (y * fh / side).min(fh - 1);
            pixels[(sy * fw + sx) * 3 + c] as f32 / 255.0
        });
        input.into_tensor()
    }

    fn decode(&self, output: &Tensor, frame: &Frame) -> Result<Vec<DetectedObject>> {
        let view = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?
            .into_dimensionality::<tract_ndarray::Ix3>()
            .context("model output was not rank 3")?;
        let (rows, anchors) = (view.shape()[1], view.shape()[2]);
        if rows < 5 {
            return Err(anyhow!("model output has {} rows, expected 4 + classes", rows));
        }

        let sx = frame.width as f32 / self.input_size as f32;
        let sy = frame.height as f32 / self.input_size as f32;
        let mut candidates: Vec<(usize, f32, [f32; 4])> = Vec::new();
        for i in 0..anchors {
            let (mut best_class, mut best_score) = (0usize, f32::NEG_INFINITY);
            for class in 0..rows - 4 {
                let score = view[[0, 4 + class, i]];
                if score > best_score {
                    best_class = class;
                    best_score = score;
                }
            }
            if best_score < self.confidence_threshold {
                continue;
            }
            let (cx, cy) = (view[[0, 0, i]], view[[0, 1, i]]);
            let (w, h) = (view[[0, 2, i]], view[[0, 3, i]]);
            let rect = [
                ((cx - w / 2.0) * sx).max(0.0),
                ((cy - h / 2.0) * sy).max(0.0),
                ((cx + w / 2.0) * sx).min(frame.width as f32),
                ((cy + h / 2.0) * sy).min(frame.height as f32),
            ];
            candidates.push((best_class, best_score, rect));
        }

        Ok(non_max_suppression(candidates)
            .into_iter()
            .filter_map(|(class, score, r)| {
                let bbox = BoundingBox::from_f32(r[0], r[1], r[2], r[3])?;
                let label = COCO_CLASSES.get(class).copied().unwrap_or("unknown");
                Some(DetectedObject::new(label, bbox, score.clamp(0.0, 1.0)))
            })
            .collect())
    }
}

impl DetectorBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn supports_label(&self, label: &str) -> bool {
        COCO_CLASSES.contains(&label)
    }

    fn detect(&mut self, frame: &Frame) -> Result<DetectionResult> {
        let input = self.build_input(frame);
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("run ONNX model")?;
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("ONNX model returned no output tensor"))?;
        let objects = self.decode(output, frame)?;
        Ok(DetectionResult {
            frame_sequence: frame.sequence,
            objects,
        })
    }
}

/// Class-wise greedy NMS, highest score first.
fn non_max_suppression(
    mut candidates: Vec<(usize, f32, [f32; 4])>,
) -> Vec<(usize, f32, [f32; 4])> {
    candidates.sort_by(|a, b| b.1.total_cmp(&a.1));
    let mut kept: Vec<(usize, f32, [f32; 4])> = Vec::new();
    for candidate in candidates {
        let suppressed = kept
            .iter()
            .any(|k| k.0 == candidate.0 && iou(&k.2, &candidate.2) > NMS_IOU);
        if !suppressed {
            kept.push(candidate);
        }
    }
    kept
}

fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    let ix = (a[2].min(b[2]) - a[0].max(b[0])).max(0.0);
    let iy = (a[3].min(b[3]) - a[1].max(b[1])).max(0.0);
    let inter = ix * iy;
    let area_a = (a[2] - a[0]) * (a[3] - a[1]);
    let area_b = (b[2] - b[0]) * (b[3] - b[1]);
    let union = area_a + area_b - inter;
    if union <= 0.0 {
        0.0
    } else {
        inter / union
    }
}
