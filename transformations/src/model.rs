use serde::{Deserialize, Serialize};

/// Result of applying one transform to one image.
///
/// Serialized as `{"imageName", "transformName", "imageBytes"}` with the
/// bytes base64-encoded.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformedImage {
    pub image_name: String,
    pub transform_name: String,
    #[serde(with = "base64_bytes")]
    pub image_bytes: Vec<u8>,
}

impl TransformedImage {
    pub fn new(
        image_name: impl Into<String>,
        transform_name: impl Into<String>,
        image_bytes: Vec<u8>,
    ) -> Self {
        Self {
            image_name: image_name.into(),
            transform_name: transform_name.into(),
            image_bytes,
        }
    }
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_field_names() {
        let image = TransformedImage::new("cat.png", "sepia", vec![1, 2, 3]);
        let json = serde_json::to_value(&image).unwrap();
        assert_eq!(json["imageName"], "cat.png");
        assert_eq!(json["transformName"], "sepia");
        assert_eq!(json["imageBytes"], "AQID");
    }

    #[test]
    fn test_json_rejects_bad_base64() {
        let json = r#"{"imageName":"a","transformName":"tint","imageBytes":"!!"}"#;
        assert!(serde_json::from_str::<TransformedImage>(json).is_err());
    }
}
