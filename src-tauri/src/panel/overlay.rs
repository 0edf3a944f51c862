//! Detection overlay
//!
//! Describes what the frontend draws over the video: the face box with its
//! score and the expression labels underneath, in the stream's native pixel
//! space.

use crate::capture::Resolution;
use crate::perception::{FaceDetection, PixelBox};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Overlay {
    /// Canvas size, equal to the video's native resolution
    pub width: u32,
    pub height: u32,

    pub face: PixelBox,

    /// Detection score with two decimals
    pub score_label: String,

    /// "<expression> (<probability>)", most confident first
    pub expression_labels: Vec<String>,
}

impl Overlay {
    /// Lay out the overlay for one face
    ///
    /// Expressions below `min_confidence` are dropped. With `mirrored` the box
    /// is flipped horizontally to line up with a mirrored preview.
    pub fn compose(
        face: &FaceDetection,
        native: Resolution,
        min_confidence: f32,
        mirrored: bool,
    ) -> Self {
        let mut pixels = face.bounding_box.to_pixels(native);
        if mirrored {
            pixels.x = native.width as f32 - pixels.x - pixels.width;
        }

        let expression_labels = face
            .expressions
            .sorted()
            .into_iter()
            .filter(|(_, p)| *p > min_confidence)
            .map(|(expression, p)| format!("{expression} ({p:.2})"))
            .collect();

        Self {
            width: native.width,
            height: native.height,
            face: pixels,
            score_label: format!("{:.2}", face.score),
            expression_labels,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::perception::{Expression, FaceBox};

    fn face() -> FaceDetection {
        FaceDetection {
            bounding_box: FaceBox {
                x: 0.1,
                y: 0.25,
                width: 0.25,
                height: 0.5,
            },
            score: 0.966,
            expressions: [
                (Expression::Neutral, 0.15),
                (Expression::Happy, 0.82),
                (Expression::Sad, 0.03),
            ]
            .into_iter()
            .collect(),
        }
    }

    #[test]
    fn test_overlay_scaled_to_native_resolution() {
        let overlay = Overlay::compose(&face(), Resolution::new(1280, 720), 0.1, false);
        assert_eq!((overlay.width, overlay.height), (1280, 720));
        assert_eq!(overlay.face.x, 128.0);
        assert_eq!(overlay.face.y, 180.0);
        assert_eq!(overlay.face.width, 320.0);
        assert_eq!(overlay.face.height, 360.0);
        assert_eq!(overlay.score_label, "0.97");
    }

    #[test]
    fn test_labels_sorted_and_filtered() {
        let overlay = Overlay::compose(&face(), Resolution::new(640, 480), 0.1, false);
        assert_eq!(
            overlay.expression_labels,
            vec!["happy (0.82)".to_string(), "neutral (0.15)".to_string()]
        );
    }

    #[test]
    fn test_mirrored_box_flips_horizontally() {
        let overlay = Overlay::compose(&face(), Resolution::new(1280, 720), 0.1, true);
        // 1280 - 128 - 320
        assert_eq!(overlay.face.x, 832.0);
        assert_eq!(overlay.face.y, 180.0);
    }
}
