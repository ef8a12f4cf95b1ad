//! Box and label rendering for the annotated preview returned by `/predict/image`.

use crate::normalizer::Detection;
use ab_glyph::{FontVec, PxScale};
use base64::{Engine, engine::general_purpose::STANDARD};
use common::span;
use image::{ImageEncoder, Rgb, RgbImage, codecs::jpeg::JpegEncoder};
use imageproc::{
    drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size},
    rect::Rect,
};
use std::path::Path;

/// One colour per class slot; ids beyond the table wrap around.
pub const PALETTE: [Rgb<u8>; 7] = [
    Rgb([255, 107, 107]),
    Rgb([78, 205, 196]),
    Rgb([69, 183, 209]),
    Rgb([255, 160, 122]),
    Rgb([152, 216, 200]),
    Rgb([247, 220, 111]),
    Rgb([231, 76, 60]),
];

const TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);
const BOX_THICKNESS: i32 = 3;
const LABEL_PAD_X: i32 = 10;
const LABEL_PAD_Y: i32 = 15;
const TEXT_BASELINE_GAP: i32 = 8;
const JPEG_QUALITY: u8 = 95;

pub fn color_for(class_id: usize) -> Rgb<u8> {
    PALETTE[class_id % PALETTE.len()]
}

/// `"Fire Alarm 87.7%"` style label.
pub fn label_for(detection: &Detection) -> String {
    format!(
        "{} {:.1}%",
        detection.class_name.replace('_', " "),
        detection.confidence * 100.0
    )
}

pub struct Annotator {
    font: Option<FontVec>,
    scale: PxScale,
}

impl Annotator {
    pub fn new(font: Option<FontVec>, scale: f32) -> Self {
        Self {
            font,
            scale: PxScale::from(scale),
        }
    }

    /// Uses the first font file that loads. Without one, labels keep their
    /// background fill but no text is drawn.
    pub fn from_font_paths<P: AsRef<Path>>(paths: &[P], scale: f32) -> Self {
        let font = paths.iter().find_map(|path| {
            let path = path.as_ref();
            let bytes = std::fs::read(path).ok()?;
            match FontVec::try_from_vec(bytes) {
                Ok(font) => {
                    tracing::info!(path = %path.display(), "Loaded label font");
                    Some(font)
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Invalid font file");
                    None
                }
            }
        });

        if font.is_none() {
            tracing::warn!("No label font found, annotations will carry boxes without text");
        }

        Self::new(font, scale)
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    fn measure(&self, text: &str) -> (i32, i32) {
        match &self.font {
            Some(font) => {
                let (w, h) = text_size(self.scale, font, text);
                (w as i32, h as i32)
            }
            None => {
                let chars = text.chars().count() as f32;
                (
                    (chars * self.scale.x * 0.55).ceil() as i32,
                    (self.scale.y * 0.7).ceil() as i32,
                )
            }
        }
    }

    /// Draws every detection onto a copy of `image`.
    pub fn render(&self, image: &RgbImage, detections: &[Detection]) -> RgbImage {
        let mut canvas = image.clone();

        for detection in detections {
            let color = color_for(detection.class_id);
            let bbox = &detection.bbox;
            let (x1, y1) = (bbox.x1 as i32, bbox.y1 as i32);
            let (x2, y2) = (bbox.x2 as i32, bbox.y2 as i32);

            for inset in -(BOX_THICKNESS / 2)..=(BOX_THICKNESS / 2) {
                let width = (x2 - x1 - 2 * inset).max(1) as u32;
                let height = (y2 - y1 - 2 * inset).max(1) as u32;
                draw_hollow_rect_mut(
                    &mut canvas,
                    Rect::at(x1 + inset, y1 + inset).of_size(width, height),
                    color,
                );
            }

            let label = label_for(detection);
            let (text_w, text_h) = self.measure(&label);
            let fill_top = y1 - text_h - LABEL_PAD_Y;
            draw_filled_rect_mut(
                &mut canvas,
                Rect::at(x1, fill_top).of_size(
                    (text_w + LABEL_PAD_X).max(1) as u32,
                    (text_h + LABEL_PAD_Y).max(1) as u32,
                ),
                color,
            );

            if let Some(font) = &self.font {
                draw_text_mut(
                    &mut canvas,
                    TEXT_COLOR,
                    x1 + LABEL_PAD_X / 2,
                    y1 - TEXT_BASELINE_GAP - text_h,
                    self.scale,
                    font,
                    &label,
                );
            }
        }

        canvas
    }

    /// Renders, encodes as JPEG and wraps in a `data:` URI.
    pub fn annotate(&self, image: &RgbImage, detections: &[Detection]) -> anyhow::Result<String> {
        let _s = span!("annotate");
        let rendered = self.render(image, detections);
        let jpeg = encode_jpeg(&rendered)?;
        Ok(to_data_uri(&jpeg))
    }
}

pub fn encode_jpeg(image: &RgbImage) -> anyhow::Result<Vec<u8>> {
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, JPEG_QUALITY).write_image(
        image.as_raw(),
        image.width(),
        image.height(),
        image::ExtendedColorType::Rgb8,
    )?;
    Ok(buf)
}

pub fn to_data_uri(jpeg: &[u8]) -> String {
    format!("data:image/jpeg;base64,{}", STANDARD.encode(jpeg))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalizer::BoundingBox;

    fn detection(class_id: usize, x1: f32, y1: f32, x2: f32, y2: f32) -> Detection {
        Detection {
            class_name: "Safety_Switch_Panel".to_string(),
            class_id,
            confidence: 0.8765,
            bbox: BoundingBox::from_corners(x1, y1, x2, y2),
        }
    }

    #[test]
    fn test_palette_wraps() {
        assert_eq!(color_for(0), Rgb([255, 107, 107]));
        assert_eq!(color_for(6), Rgb([231, 76, 60]));
        assert_eq!(color_for(7), color_for(0));
        assert_eq!(color_for(99), color_for(1));
    }

    #[test]
    fn test_label_format() {
        let det = detection(4, 0.0, 0.0, 1.0, 1.0);
        assert_eq!(label_for(&det), "Safety Switch Panel 87.7%");
    }

    #[test]
    fn test_render_draws_box_in_class_colour() {
        let image = RgbImage::from_pixel(200, 200, Rgb([0, 0, 0]));
        let annotator = Annotator::new(None, 22.0);
        let out = annotator.render(&image, &[detection(2, 50.0, 80.0, 150.0, 180.0)]);

        let color = color_for(2);
        // 3px border straddles the box edge.
        assert_eq!(*out.get_pixel(49, 130), color);
        assert_eq!(*out.get_pixel(50, 130), color);
        assert_eq!(*out.get_pixel(51, 130), color);
        assert_eq!(*out.get_pixel(100, 130), Rgb([0, 0, 0]));
        // Label fill sits above the box.
        assert_eq!(*out.get_pixel(55, 70), color);
    }

    #[test]
    fn test_render_leaves_input_untouched() {
        let image = RgbImage::from_pixel(64, 64, Rgb([10, 20, 30]));
        let annotator = Annotator::new(None, 22.0);
        let _ = annotator.render(&image, &[detection(0, 5.0, 5.0, 60.0, 60.0)]);

        assert!(image.pixels().all(|p| *p == Rgb([10, 20, 30])));
    }

    #[test]
    fn test_degenerate_and_offscreen_boxes_do_not_panic() {
        let image = RgbImage::new(32, 32);
        let annotator = Annotator::new(None, 22.0);
        let dets = [
            detection(0, 10.0, 10.0, 10.0, 10.0),
            detection(1, 0.0, 0.0, 31.0, 31.0),
            detection(3, 31.0, 31.0, 31.0, 31.0),
        ];
        let out = annotator.render(&image, &dets);
        assert_eq!(out.dimensions(), (32, 32));
    }

    #[test]
    fn test_data_uri_round_trips_to_jpeg() {
        let image = RgbImage::from_pixel(40, 30, Rgb([120, 60, 200]));
        let uri = Annotator::new(None, 22.0).annotate(&image, &[]).unwrap();

        let encoded = uri.strip_prefix("data:image/jpeg;base64,").unwrap();
        let bytes = STANDARD.decode(encoded).unwrap();
        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (40, 30));
    }

    #[test]
    fn test_missing_fonts_are_tolerated() {
        let annotator = Annotator::from_font_paths(&["/nonexistent/font.ttf"], 22.0);
        assert!(!annotator.has_font());
    }
}
