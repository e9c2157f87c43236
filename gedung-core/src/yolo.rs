// YOLOv8 ONNX detector executed with tract

use crate::classify::{Detection, Detector};
use crate::error::ClassifyError;
use image::imageops::{self, FilterType};
use image::{DynamicImage, RgbImage};
use std::path::Path;
use tracing::{debug, info};
use tract_onnx::prelude::*;

type YoloPlan = TypedRunnableModel<TypedModel>;

pub struct YoloDetector {
    plan: YoloPlan,
    input_size: u32,
    iou_threshold: f32,
}

impl YoloDetector {
    pub fn load(path: &Path, input_size: u32, iou_threshold: f32) -> Result<Self, ClassifyError> {
        if !path.is_file() {
            return Err(ClassifyError::ModelNotFound(path.display().to_string()));
        }

        let edge = input_size as usize;
        let plan = tract_onnx::onnx()
            .model_for_path(path)
            .map_err(load_error)?
            .with_input_fact(0, f32::fact([1, 3, edge, edge]).into())
            .map_err(load_error)?
            .into_optimized()
            .map_err(load_error)?
            .into_runnable()
            .map_err(load_error)?;

        info!(path = %path.display(), input_size, "Model ready");
        Ok(Self {
            plan,
            input_size,
            iou_threshold,
        })
    }

    /// Letterbox into the square input and lay out as NCHW floats in 0..1.
    fn preprocess(&self, image: &DynamicImage) -> (Tensor, Letterbox) {
        let letterbox = Letterbox::fit(image.width(), image.height(), self.input_size);
        let canvas = letterbox.apply(image);

        let edge = self.input_size as usize;
        let tensor = tract_ndarray::Array4::from_shape_fn((1, 3, edge, edge), |(_, c, y, x)| {
            canvas.get_pixel(x as u32, y as u32)[c] as f32 / 255.0
        })
        .into();
        (tensor, letterbox)
    }
}

/// Gray used for the letterbox bars.
const PAD_VALUE: u8 = 114;

/// Aspect-preserving fit of a source image into the square model input:
/// scale by the smaller ratio, then centre with gray bars.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Letterbox {
    pub scale: f32,
    pub width: u32,
    pub height: u32,
    pub pad_left: u32,
    pub pad_top: u32,
    pub edge: u32,
    source_width: u32,
    source_height: u32,
}

impl Letterbox {
    pub(crate) fn fit(source_width: u32, source_height: u32, edge: u32) -> Self {
        let scale = (edge as f32 / source_width.max(1) as f32)
            .min(edge as f32 / source_height.max(1) as f32);
        let width = ((source_width as f32 * scale).round() as u32).clamp(1, edge);
        let height = ((source_height as f32 * scale).round() as u32).clamp(1, edge);

        // Odd padding puts the extra pixel on the bottom/right
        let pad_left = ((edge - width) as f32 / 2.0 - 0.1).round().max(0.0) as u32;
        let pad_top = ((edge - height) as f32 / 2.0 - 0.1).round().max(0.0) as u32;

        Self {
            scale,
            width,
            height,
            pad_left,
            pad_top,
            edge,
            source_width,
            source_height,
        }
    }

    pub(crate) fn apply(&self, image: &DynamicImage) -> RgbImage {
        let resized = image
            .resize_exact(self.width, self.height, FilterType::Triangle)
            .to_rgb8();
        let mut canvas = RgbImage::new(self.edge, self.edge);
        canvas.fill(PAD_VALUE);
        imageops::overlay(&mut canvas, &resized, self.pad_left as i64, self.pad_top as i64);
        canvas
    }

    /// Map a box from model input pixels back onto the source image,
    /// clipped to its bounds.
    pub(crate) fn unscale(&self, d: Detection) -> Detection {
        let max_x = self.source_width as f32;
        let max_y = self.source_height as f32;
        let x1 = ((d.x - self.pad_left as f32) / self.scale).clamp(0.0, max_x);
        let y1 = ((d.y - self.pad_top as f32) / self.scale).clamp(0.0, max_y);
        let x2 = ((d.x + d.width - self.pad_left as f32) / self.scale).clamp(0.0, max_x);
        let y2 = ((d.y + d.height - self.pad_top as f32) / self.scale).clamp(0.0, max_y);

        Detection {
            x: x1,
            y: y1,
            width: x2 - x1,
            height: y2 - y1,
            ..d
        }
    }
}

/// Number of anchors a YOLOv8 head produces for a square input: one per
/// cell of the stride 8, 16 and 32 grids.
pub(crate) fn anchor_count(input_size: u32) -> usize {
    [8, 16, 32]
        .iter()
        .map(|stride| {
            let cells = (input_size / stride) as usize;
            cells * cells
        })
        .sum()
}

impl Detector for YoloDetector {
    fn detect(
        &self,
        image: &DynamicImage,
        confidence: f32,
    ) -> Result<Vec<Detection>, ClassifyError> {
        let (input, letterbox) = self.preprocess(image);
        let outputs = self
            .plan
            .run(tvec!(input.into()))
            .map_err(|e| ClassifyError::Inference(e.to_string()))?;

        let output = outputs
            .first()
            .ok_or_else(|| ClassifyError::Inference("model produced no outputs".to_string()))?;
        let view = output
            .to_array_view::<f32>()
            .map_err(|e| ClassifyError::Inference(e.to_string()))?;

        let shape = view.shape().to_vec();
        let values: Vec<f32> = view.iter().copied().collect();

        let candidates =
            decode_predictions(&values, &shape, confidence, anchor_count(self.input_size))?;
        let kept = non_max_suppression(candidates, self.iou_threshold);
        debug!(boxes = kept.len(), "Detections after NMS");

        Ok(kept.into_iter().map(|d| letterbox.unscale(d)).collect())
    }
}

fn load_error(e: impl std::fmt::Display) -> ClassifyError {
    ClassifyError::ModelLoad(e.to_string())
}

/// Decode a YOLOv8 head: `[1, 4 + classes, anchors]` (or its transpose),
/// each anchor carrying a centre-based box followed by per-class scores.
/// Boxes come back top-left based, in model input pixels.
///
/// The axis matching `expected_anchors` is the anchor axis. When neither
/// does (an unusual export), the longer axis is taken.
pub(crate) fn decode_predictions(
    values: &[f32],
    shape: &[usize],
    confidence: f32,
    expected_anchors: usize,
) -> Result<Vec<Detection>, ClassifyError> {
    let (rows, cols) = match shape {
        [1, rows, cols] => (*rows, *cols),
        _ => return Err(ClassifyError::OutputShape(shape.to_vec())),
    };

    let transposed = if cols == expected_anchors {
        false
    } else if rows == expected_anchors {
        true
    } else {
        rows > cols
    };
    let (attributes, anchors) = if transposed { (cols, rows) } else { (rows, cols) };
    if attributes < 5 || values.len() != attributes * anchors {
        return Err(ClassifyError::OutputShape(shape.to_vec()));
    }

    let at = |attr: usize, anchor: usize| {
        if transposed {
            values[anchor * attributes + attr]
        } else {
            values[attr * anchors + anchor]
        }
    };

    let mut detections = Vec::new();
    for anchor in 0..anchors {
        let (class_id, score) = (4..attributes)
            .map(|attr| (attr - 4, at(attr, anchor)))
            .fold((0, f32::MIN), |best, cur| if cur.1 > best.1 { cur } else { best });

        if score < confidence {
            continue;
        }

        let (cx, cy, w, h) = (
            at(0, anchor),
            at(1, anchor),
            at(2, anchor),
            at(3, anchor),
        );
        detections.push(Detection {
            x: cx - w / 2.0,
            y: cy - h / 2.0,
            width: w,
            height: h,
            confidence: score,
            class_id,
        });
    }

    Ok(detections)
}

/// Greedy per-class NMS, highest confidence first.
pub(crate) fn non_max_suppression(mut detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut keep: Vec<Detection> = Vec::new();
    for candidate in detections {
        let overlaps = keep.iter().any(|kept| {
            kept.class_id == candidate.class_id && iou(kept, &candidate) > iou_threshold
        });
        if !overlaps {
            keep.push(candidate);
        }
    }
    keep
}

fn iou(a: &Detection, b: &Detection) -> f32 {
    let x1 = a.x.max(b.x);
    let y1 = a.y.max(b.y);
    let x2 = (a.x + a.width).min(b.x + b.width);
    let y2 = (a.y + a.height).min(b.y + b.height);

    let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    let union = a.width * a.height + b.width * b.height - intersection;

    if union > 0.0 { intersection / union } else { 0.0 }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(x: f32, y: f32, w: f32, h: f32, confidence: f32, class_id: usize) -> Detection {
        Detection {
            x,
            y,
            width: w,
            height: h,
            confidence,
            class_id,
        }
    }

    // Channel-major head with one class: rows are cx, cy, w, h, score.
    fn single_class_head(anchors: &[[f32; 5]]) -> (Vec<f32>, Vec<usize>) {
        let n = anchors.len();
        let mut values = vec![0.0; 5 * n];
        for (i, a) in anchors.iter().enumerate() {
            for attr in 0..5 {
                values[attr * n + i] = a[attr];
            }
        }
        (values, vec![1, 5, n])
    }

    #[test]
    fn test_decode_filters_by_confidence() {
        let (values, shape) = single_class_head(&[
            [100.0, 100.0, 20.0, 40.0, 0.9],
            [300.0, 300.0, 10.0, 10.0, 0.1],
            [50.0, 60.0, 10.0, 10.0, 0.25],
            [10.0, 10.0, 4.0, 4.0, 0.2],
            [20.0, 20.0, 4.0, 4.0, 0.0],
            [30.0, 30.0, 4.0, 4.0, 0.0],
        ]);

        let detections = decode_predictions(&values, &shape, 0.25, 6).unwrap();

        assert_eq!(detections.len(), 2);
        assert_eq!(detections[0], det(90.0, 80.0, 20.0, 40.0, 0.9, 0));
        assert_eq!(detections[1].confidence, 0.25);
    }

    #[test]
    fn test_decode_picks_best_class() {
        // 2 classes, 6 anchors, channel-major
        let n = 6;
        let mut values = vec![0.0; 6 * n];
        values[0] = 10.0; // cx
        values[n] = 10.0; // cy
        values[2 * n] = 4.0; // w
        values[3 * n] = 4.0; // h
        values[4 * n] = 0.3; // class 0
        values[5 * n] = 0.8; // class 1

        let detections = decode_predictions(&values, &[1, 6, n], 0.25, n).unwrap();

        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].class_id, 1);
        assert_eq!(detections[0].confidence, 0.8);
    }

    #[test]
    fn test_decode_transposed_head() {
        // 8 anchors x 5 attributes, anchor-major
        let mut values = vec![0.0; 8 * 5];
        values[3 * 5..3 * 5 + 5].copy_from_slice(&[40.0, 40.0, 8.0, 8.0, 0.7]);

        let detections = decode_predictions(&values, &[1, 8, 5], 0.25, 8).unwrap();

        assert_eq!(detections, vec![det(36.0, 36.0, 8.0, 8.0, 0.7, 0)]);
    }

    #[test]
    fn test_decode_rejects_unexpected_shape() {
        let err = decode_predictions(&[0.0; 4], &[4], 0.25, 4).unwrap_err();
        assert!(matches!(err, ClassifyError::OutputShape(_)));

        let err = decode_predictions(&[0.0; 12], &[1, 3, 4], 0.25, 4).unwrap_err();
        assert!(matches!(err, ClassifyError::OutputShape(_)));
    }

    #[test]
    fn test_anchor_count() {
        assert_eq!(anchor_count(640), 8400);
        assert_eq!(anchor_count(32), 21);
    }

    #[test]
    fn test_decode_layout_follows_anchor_grid() {
        // Input 32 with 80 classes: 84 attributes outnumber the 21 anchors
        let (attributes, anchors) = (84, 21);
        let mut channel_major = vec![0.0; attributes * anchors];
        for (attr, value) in [(0, 16.0), (1, 12.0), (2, 8.0), (3, 4.0), (4 + 79, 0.9)] {
            channel_major[attr * anchors + 5] = value;
        }

        let detections =
            decode_predictions(&channel_major, &[1, attributes, anchors], 0.25, anchors).unwrap();
        assert_eq!(detections, vec![det(12.0, 10.0, 8.0, 4.0, 0.9, 79)]);

        let mut anchor_major = vec![0.0; attributes * anchors];
        for attr in 0..attributes {
            anchor_major[5 * attributes + attr] = channel_major[attr * anchors + 5];
        }
        let detections =
            decode_predictions(&anchor_major, &[1, anchors, attributes], 0.25, anchors).unwrap();
        assert_eq!(detections, vec![det(12.0, 10.0, 8.0, 4.0, 0.9, 79)]);
    }

    #[test]
    fn test_letterbox_wide_image() {
        let lb = Letterbox::fit(1280, 320, 640);

        assert_eq!(lb.scale, 0.5);
        assert_eq!((lb.width, lb.height), (640, 160));
        assert_eq!((lb.pad_left, lb.pad_top), (0, 240));
    }

    #[test]
    fn test_letterbox_tall_odd_padding() {
        let lb = Letterbox::fit(100, 200, 64);

        assert_eq!((lb.width, lb.height), (32, 64));
        assert_eq!((lb.pad_left, lb.pad_top), (16, 0));

        let lb = Letterbox::fit(10, 21, 64);
        assert_eq!(lb.height, 64);
        // 64 * 10 / 21 = 30.48 -> 30, leaving 34 = 17 + 17
        assert_eq!((lb.width, lb.pad_left), (30, 17));
    }

    #[test]
    fn test_letterbox_canvas_is_padded_gray() {
        let source = DynamicImage::ImageRgb8(RgbImage::from_pixel(40, 10, image::Rgb([255, 0, 0])));
        let lb = Letterbox::fit(40, 10, 32);
        let canvas = lb.apply(&source);

        assert_eq!(canvas.dimensions(), (32, 32));
        assert_eq!((lb.height, lb.pad_top), (8, 12));
        assert_eq!(canvas.get_pixel(16, 0).0, [PAD_VALUE; 3]);
        assert_eq!(canvas.get_pixel(16, 31).0, [PAD_VALUE; 3]);
        let inside = canvas.get_pixel(16, 16).0;
        assert!(inside[0] > 250 && inside[1] < 5 && inside[2] < 5, "{:?}", inside);
    }

    #[test]
    fn test_unscale_undoes_padding_and_ratio() {
        let lb = Letterbox::fit(1280, 320, 640);

        // A box inside the content band maps back at twice the size
        let mapped = lb.unscale(det(100.0, 250.0, 50.0, 40.0, 0.8, 0));
        assert_eq!(mapped, det(200.0, 20.0, 100.0, 80.0, 0.8, 0));

        // Parts over the gray bars are clipped away
        let clipped = lb.unscale(det(600.0, 200.0, 100.0, 100.0, 0.8, 0));
        assert_eq!(clipped, det(1200.0, 0.0, 80.0, 120.0, 0.8, 0));
    }

    #[test]
    fn test_nms_suppresses_overlapping_boxes() {
        let detections = vec![
            det(0.0, 0.0, 10.0, 10.0, 0.6, 0),
            det(1.0, 1.0, 10.0, 10.0, 0.9, 0),
            det(50.0, 50.0, 10.0, 10.0, 0.5, 0),
        ];

        let kept = non_max_suppression(detections, 0.5);

        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].confidence, 0.9);
        assert_eq!(kept[1].confidence, 0.5);
    }

    #[test]
    fn test_nms_keeps_overlapping_boxes_of_other_classes() {
        let detections = vec![
            det(0.0, 0.0, 10.0, 10.0, 0.9, 0),
            det(0.0, 0.0, 10.0, 10.0, 0.8, 1),
        ];

        assert_eq!(non_max_suppression(detections, 0.5).len(), 2);
    }

    #[test]
    fn test_iou() {
        let a = det(0.0, 0.0, 10.0, 10.0, 1.0, 0);
        assert_eq!(iou(&a, &a), 1.0);
        assert_eq!(iou(&a, &det(20.0, 20.0, 5.0, 5.0, 1.0, 0)), 0.0);
        let half = iou(&a, &det(5.0, 0.0, 10.0, 10.0, 1.0, 0));
        assert!((half - 50.0 / 150.0).abs() < 1e-6);
    }
}
