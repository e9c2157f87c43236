// Shared fixtures for gedung-core integration tests
#![allow(dead_code)]

use calamine::{Data, Reader, open_workbook_auto};
use gedung_core::{ClassifyError, Detection, Detector};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use rust_xlsxwriter::Workbook;
use std::io::Cursor;
use std::path::Path;

pub const RED: [u8; 3] = [230, 20, 20];
pub const BLUE: [u8; 3] = [20, 20, 230];

/// Stand-in model: a red image "contains a building", anything else does not.
pub struct RedMeansBuilding;

impl Detector for RedMeansBuilding {
    fn detect(
        &self,
        image: &DynamicImage,
        _confidence: f32,
    ) -> Result<Vec<Detection>, ClassifyError> {
        let rgb = image.to_rgb8();
        let (w, h) = rgb.dimensions();
        let centre = rgb.get_pixel(w / 2, h / 2);

        if centre[0] > 200 && centre[2] < 50 {
            Ok(vec![Detection {
                x: 1.0,
                y: 1.0,
                width: (w - 2) as f32,
                height: (h - 2) as f32,
                confidence: 0.9,
                class_id: 0,
            }])
        } else {
            Ok(vec![])
        }
    }
}

/// Model that blows up on every image.
pub struct BrokenDetector;

impl Detector for BrokenDetector {
    fn detect(
        &self,
        _image: &DynamicImage,
        _confidence: f32,
    ) -> Result<Vec<Detection>, ClassifyError> {
        Err(ClassifyError::Inference("tensor shape mismatch".to_string()))
    }
}

pub fn png_bytes(color: [u8; 3]) -> Vec<u8> {
    let img = RgbImage::from_pixel(16, 16, Rgb(color));
    let mut buf = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img)
        .write_to(&mut buf, ImageFormat::Png)
        .unwrap();
    buf.into_inner()
}

/// Workbook with a header row and one row per entry in `urls`, plus an
/// unrelated column to make sure it is ignored.
pub fn write_input_xlsx(path: &Path, urls: &[&str]) {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.write_string(0, 0, "No").unwrap();
    sheet.write_string(0, 1, "URL").unwrap();
    for (i, url) in urls.iter().enumerate() {
        let row = (i + 1) as u32;
        sheet.write_number(row, 0, (i + 1) as f64).unwrap();
        sheet.write_string(row, 1, *url).unwrap();
    }
    workbook.save(path).unwrap();
}

/// All rows of the first sheet as strings.
pub fn read_sheet(path: &Path) -> Vec<Vec<String>> {
    let mut workbook = open_workbook_auto(path).unwrap();
    let range = workbook.worksheet_range_at(0).unwrap().unwrap();
    range
        .rows()
        .map(|row| row.iter().map(cell_text).collect())
        .collect()
}

fn cell_text(cell: &Data) -> String {
    cell.to_string()
}
