use std::fmt;
use std::str::FromStr;

use crate::error::TransformationError;
use crate::pixels;

/// Weights applied by the `tint` transform, as (red, green, blue).
pub const DEFAULT_TINT: (f32, f32, f32) = (0.0, 0.0, 0.9);

/// A named pixel transform supported by [`crate::TransformWorker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transform {
    Grayscale,
    Sepia,
    Tint,
}

impl Transform {
    pub const ALL: [Transform; 3] = [Transform::Grayscale, Transform::Sepia, Transform::Tint];

    pub fn name(&self) -> &'static str {
        match self {
            Transform::Grayscale => "grayscale",
            Transform::Sepia => "sepia",
            Transform::Tint => "tint",
        }
    }

    /// Runs the pixel operation for this transform in place.
    pub fn apply(&self, pixels: &mut [u32], has_alpha: bool) {
        match self {
            Transform::Grayscale => pixels::grayscale(pixels, has_alpha),
            Transform::Sepia => pixels::sepia(pixels, has_alpha),
            Transform::Tint => {
                let (r, g, b) = DEFAULT_TINT;
                pixels::tint(pixels, has_alpha, r, g, b)
            }
        }
    }
}

impl fmt::Display for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Transform {
    type Err = TransformationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        Transform::ALL
            .into_iter()
            .find(|t| t.name().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| TransformationError::UnsupportedTransform(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_case_insensitive() {
        assert_eq!("GrayScale".parse::<Transform>().unwrap(), Transform::Grayscale);
        assert_eq!(" SEPIA ".parse::<Transform>().unwrap(), Transform::Sepia);
        assert_eq!("tint".parse::<Transform>().unwrap(), Transform::Tint);
    }

    #[test]
    fn test_parse_unknown() {
        let err = "bogus".parse::<Transform>().unwrap_err();
        assert!(matches!(
            err,
            TransformationError::UnsupportedTransform(ref name) if name == "bogus"
        ));
    }

    #[test]
    fn test_display_is_canonical() {
        for transform in Transform::ALL {
            assert_eq!(transform.to_string().parse::<Transform>().unwrap(), transform);
            assert_eq!(transform.to_string(), transform.name().to_lowercase());
        }
    }
}
