// Adapter between the pipeline and whatever object detector is plugged in

use crate::error::ClassifyError;
use crate::yolo::YoloDetector;
use image::{DynamicImage, Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info};

pub const DEFAULT_CONFIDENCE: f32 = 0.25;

const OVERLAY_COLOR: Rgb<u8> = Rgb([255, 56, 56]);

/// One box in source-image pixel coordinates, top-left origin.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    pub class_id: usize,
}

pub trait Detector: Send + Sync {
    /// Boxes scoring at least `confidence`. May block for a while.
    fn detect(&self, image: &DynamicImage, confidence: f32)
    -> Result<Vec<Detection>, ClassifyError>;
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Classification {
    pub detections: Vec<Detection>,
}

impl Classification {
    /// Any box at all means "building".
    pub fn has_detections(&self) -> bool {
        !self.detections.is_empty()
    }

    /// Copy of `image` with every detection outlined.
    pub fn render_overlay(&self, image: &DynamicImage) -> RgbImage {
        let mut canvas = image.to_rgb8();
        let (width, height) = canvas.dimensions();
        let thickness = (width.min(height) / 200).max(2) as i32;

        for det in &self.detections {
            let w = det.width.round().max(1.0) as u32;
            let h = det.height.round().max(1.0) as u32;
            for t in 0..thickness {
                let grow = (2 * t) as u32;
                let rect = Rect::at(det.x.round() as i32 - t, det.y.round() as i32 - t)
                    .of_size(w + grow, h + grow);
                draw_hollow_rect_mut(&mut canvas, rect, OVERLAY_COLOR);
            }
        }

        canvas
    }
}

#[derive(Clone)]
pub struct Classifier {
    detector: Arc<dyn Detector>,
    confidence: f32,
}

impl Classifier {
    pub fn new(detector: Arc<dyn Detector>) -> Self {
        Self {
            detector,
            confidence: DEFAULT_CONFIDENCE,
        }
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    /// One model call per image.
    pub fn classify(&self, image: &DynamicImage) -> Result<Classification, ClassifyError> {
        let detections = self.detector.detect(image, self.confidence)?;
        debug!(
            boxes = detections.len(),
            confidence = self.confidence,
            "Classified image"
        );
        Ok(Classification { detections })
    }
}

/// Model shared by every row and every run in the process. Loaded on first
/// use and read-only afterwards.
pub struct SharedModel {
    path: PathBuf,
    input_size: u32,
    iou_threshold: f32,
    detector: OnceCell<Arc<dyn Detector>>,
}

impl SharedModel {
    pub fn new(path: impl Into<PathBuf>, input_size: u32, iou_threshold: f32) -> Self {
        Self {
            path: path.into(),
            input_size,
            iou_threshold,
            detector: OnceCell::new(),
        }
    }

    /// Wraps an already constructed detector; `get` never touches disk.
    pub fn with_detector(detector: Arc<dyn Detector>) -> Self {
        Self {
            path: PathBuf::new(),
            input_size: 0,
            iou_threshold: 0.0,
            detector: OnceCell::new_with(Some(detector)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_loaded(&self) -> bool {
        self.detector.initialized()
    }

    /// Whether a `get` has a chance of succeeding.
    pub fn is_available(&self) -> bool {
        self.is_loaded() || self.path.is_file()
    }

    pub async fn get(&self) -> Result<Arc<dyn Detector>, ClassifyError> {
        let detector = self
            .detector
            .get_or_try_init(|| async {
                let path = self.path.clone();
                let input_size = self.input_size;
                let iou_threshold = self.iou_threshold;
                info!(path = %path.display(), "Loading detection model");

                let loaded = tokio::task::spawn_blocking(move || {
                    YoloDetector::load(&path, input_size, iou_threshold)
                })
                .await
                .map_err(|e| ClassifyError::ModelLoad(e.to_string()))??;

                Ok::<Arc<dyn Detector>, ClassifyError>(Arc::new(loaded))
            })
            .await?;

        Ok(detector.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedDetector {
        boxes: Vec<Detection>,
        calls: AtomicUsize,
        seen_confidence: std::sync::Mutex<Option<f32>>,
    }

    impl Detector for FixedDetector {
        fn detect(
            &self,
            _image: &DynamicImage,
            confidence: f32,
        ) -> Result<Vec<Detection>, ClassifyError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.seen_confidence.lock().unwrap() = Some(confidence);
            Ok(self.boxes.clone())
        }
    }

    fn detection(x: f32, y: f32, w: f32, h: f32) -> Detection {
        Detection {
            x,
            y,
            width: w,
            height: h,
            confidence: 0.9,
            class_id: 0,
        }
    }

    #[test]
    fn test_classify_passes_threshold_and_reports_detections() {
        let detector = Arc::new(FixedDetector {
            boxes: vec![detection(1.0, 1.0, 4.0, 4.0)],
            calls: AtomicUsize::new(0),
            seen_confidence: std::sync::Mutex::new(None),
        });
        let classifier = Classifier::new(detector.clone());
        let image = DynamicImage::new_rgb8(16, 16);

        let result = classifier.classify(&image).unwrap();

        assert!(result.has_detections());
        assert_eq!(detector.calls.load(Ordering::SeqCst), 1);
        assert_eq!(*detector.seen_confidence.lock().unwrap(), Some(0.25));
    }

    #[test]
    fn test_no_boxes_means_no_detections() {
        let detector = Arc::new(FixedDetector {
            boxes: vec![],
            calls: AtomicUsize::new(0),
            seen_confidence: std::sync::Mutex::new(None),
        });
        let classifier = Classifier::new(detector).with_confidence(0.5);

        let result = classifier.classify(&DynamicImage::new_rgb8(8, 8)).unwrap();

        assert!(!result.has_detections());
        assert_eq!(classifier.confidence(), 0.5);
    }

    #[test]
    fn test_overlay_outlines_box() {
        let classification = Classification {
            detections: vec![detection(10.0, 10.0, 20.0, 20.0)],
        };
        let image = DynamicImage::new_rgb8(64, 64);

        let overlay = classification.render_overlay(&image);

        assert_eq!(overlay.dimensions(), (64, 64));
        assert_eq!(*overlay.get_pixel(10, 10), OVERLAY_COLOR);
        assert_eq!(*overlay.get_pixel(20, 10), OVERLAY_COLOR);
        // inside the box stays untouched
        assert_eq!(*overlay.get_pixel(20, 20), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_overlay_clips_boxes_past_the_edge() {
        let classification = Classification {
            detections: vec![detection(-5.0, 50.0, 100.0, 100.0)],
        };
        let overlay = classification.render_overlay(&DynamicImage::new_rgb8(64, 64));
        assert_eq!(overlay.dimensions(), (64, 64));
    }

    #[tokio::test]
    async fn test_missing_model_file() {
        let model = SharedModel::new("/definitely/not/here/best.onnx", 640, 0.7);
        assert!(!model.is_available());

        let err = model.get().await.err().expect("load should fail");
        assert!(matches!(err, ClassifyError::ModelNotFound(_)));
        assert!(!model.is_loaded());
    }

    #[tokio::test]
    async fn test_injected_detector_is_reused() {
        let detector: Arc<dyn Detector> = Arc::new(FixedDetector {
            boxes: vec![],
            calls: AtomicUsize::new(0),
            seen_confidence: std::sync::Mutex::new(None),
        });
        let model = SharedModel::with_detector(detector.clone());

        assert!(model.is_available());
        let first = model.get().await.unwrap();
        let second = model.get().await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }
}
