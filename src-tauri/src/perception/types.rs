//! Face and expression types
//!
//! These mirror what the expression net produces: a detection box with a
//! confidence, plus a probability for each of seven expressions.

use crate::capture::Resolution;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Facial expression classes of the expression net
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Expression {
    Neutral,
    Happy,
    Sad,
    Angry,
    Fearful,
    Disgusted,
    Surprised,
}

impl Expression {
    pub fn as_str(&self) -> &'static str {
        match self {
            Expression::Neutral => "neutral",
            Expression::Happy => "happy",
            Expression::Sad => "sad",
            Expression::Angry => "angry",
            Expression::Fearful => "fearful",
            Expression::Disgusted => "disgusted",
            Expression::Surprised => "surprised",
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Expression label to confidence in [0, 1]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExpressionScores(BTreeMap<Expression, f32>);

impl ExpressionScores {
    pub fn get(&self, expression: Expression) -> Option<f32> {
        self.0.get(&expression).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Expression, f32)> + '_ {
        self.0.iter().map(|(e, c)| (*e, *c))
    }

    /// Expressions ordered by descending confidence
    pub fn sorted(&self) -> Vec<(Expression, f32)> {
        let mut entries: Vec<_> = self.iter().collect();
        entries.sort_by(|a, b| b.1.total_cmp(&a.1));
        entries
    }

    /// The most confident expression
    pub fn dominant(&self) -> Option<Expression> {
        self.sorted().first().map(|(e, _)| *e)
    }
}

impl FromIterator<(Expression, f32)> for ExpressionScores {
    fn from_iter<I: IntoIterator<Item = (Expression, f32)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Face bounding box relative to the analyzed frame (all values in [0, 1])
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FaceBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl FaceBox {
    /// Scale to pixel coordinates of the given resolution
    pub fn to_pixels(&self, resolution: Resolution) -> PixelBox {
        let (w, h) = (resolution.width as f32, resolution.height as f32);
        PixelBox {
            x: self.x * w,
            y: self.y * h,
            width: self.width * w,
            height: self.height * h,
        }
    }

    pub fn is_normalized(&self) -> bool {
        let unit = 0.0..=1.0;
        unit.contains(&self.x)
            && unit.contains(&self.y)
            && unit.contains(&self.width)
            && unit.contains(&self.height)
    }
}

/// Bounding box in pixels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PixelBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// One detected face with its expression probabilities
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FaceDetection {
    pub bounding_box: FaceBox,
    pub score: f32,
    pub expressions: ExpressionScores,
}

/// Pick the face with the highest detection score; the first one wins ties
pub fn best_face(detections: &[FaceDetection]) -> Option<&FaceDetection> {
    detections.iter().fold(None, |best, candidate| match best {
        Some(current) if candidate.score <= current.score => Some(current),
        _ => Some(candidate),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn face(score: f32, happy: f32) -> FaceDetection {
        FaceDetection {
            bounding_box: FaceBox {
                x: 0.1,
                y: 0.1,
                width: 0.2,
                height: 0.2,
            },
            score,
            expressions: [(Expression::Happy, happy)].into_iter().collect(),
        }
    }

    #[test]
    fn test_best_face_prefers_highest_score() {
        let faces = vec![face(0.6, 0.1), face(0.9, 0.2), face(0.7, 0.3)];
        let best = best_face(&faces).unwrap();
        assert_eq!(best.expressions.get(Expression::Happy), Some(0.2));
    }

    #[test]
    fn test_best_face_tie_keeps_first() {
        let faces = vec![face(0.8, 0.1), face(0.8, 0.2)];
        let best = best_face(&faces).unwrap();
        assert_eq!(best.expressions.get(Expression::Happy), Some(0.1));
    }

    #[test]
    fn test_best_face_empty() {
        assert!(best_face(&[]).is_none());
    }

    #[test]
    fn test_scores_sorted_and_dominant() {
        let scores: ExpressionScores = [
            (Expression::Neutral, 0.15),
            (Expression::Happy, 0.82),
            (Expression::Sad, 0.03),
        ]
        .into_iter()
        .collect();

        assert_eq!(scores.dominant(), Some(Expression::Happy));
        let order: Vec<_> = scores.sorted().into_iter().map(|(e, _)| e).collect();
        assert_eq!(
            order,
            vec![Expression::Happy, Expression::Neutral, Expression::Sad]
        );
    }

    #[test]
    fn test_scores_serialize_as_label_map() {
        let scores: ExpressionScores = [(Expression::Surprised, 0.5)].into_iter().collect();
        let json = serde_json::to_string(&scores).unwrap();
        assert_eq!(json, r#"{"surprised":0.5}"#);
    }

    #[test]
    fn test_face_box_scales_to_resolution() {
        let bbox = FaceBox {
            x: 0.25,
            y: 0.5,
            width: 0.5,
            height: 0.25,
        };
        let pixels = bbox.to_pixels(Resolution::new(640, 480));
        assert_eq!(pixels.x, 160.0);
        assert_eq!(pixels.y, 240.0);
        assert_eq!(pixels.width, 320.0);
        assert_eq!(pixels.height, 120.0);
    }
}
