use base64::{engine::general_purpose, Engine};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use std::path::Path;

/// One image ready to be previewed and uploaded
#[derive(Debug, Clone, PartialEq)]
pub struct ImagePayload {
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl ImagePayload {
    pub fn new(file_name: impl Into<String>, mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            mime_type: mime_type.into(),
            bytes,
        }
    }

    /// Read an image from disk. The extension decides the MIME type, nothing else is checked.
    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        let bytes = std::fs::read(path)
            .map_err(|e| anyhow::anyhow!("Failed to read image {}: {}", path.display(), e))?;

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "image".to_string());

        Ok(Self::new(file_name.clone(), mime_type_for(&file_name), bytes))
    }

    pub fn data_url(&self) -> String {
        format!(
            "data:{};base64,{}",
            self.mime_type,
            general_purpose::STANDARD.encode(&self.bytes)
        )
    }
}

pub fn mime_type_for(file_name: &str) -> &'static str {
    let lower = file_name.to_lowercase();
    match lower.rsplit_once('.').map(|(_, ext)| ext) {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("bmp") => "image/bmp",
        _ => "image/jpeg",
    }
}

/// What the preview area currently shows
#[derive(Debug, Clone, PartialEq)]
pub enum Preview {
    /// Local image inlined as a data URL
    Inline { file_name: String, data_url: String },
    /// Camera is open, a snapshot follows after the delay
    LiveCamera { device: String },
    /// Annotated image served by the prediction service
    Remote { url: String },
}

/// Body returned by `POST /predict`.
///
/// Every field is optional and tolerant of wrong JSON types; a mistyped
/// field reads as absent.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PredictionResponse {
    #[serde(default, deserialize_with = "lenient")]
    pub error: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub result_image: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub analyzed_image: Option<String>,
    #[serde(default, deserialize_with = "lenient_items")]
    pub items: Vec<DetectedItem>,
}

impl PredictionResponse {
    /// Service-side error, empty strings count as no error
    pub fn service_error(&self) -> Option<&str> {
        self.error.as_deref().filter(|e| !e.is_empty())
    }

    pub fn result_image_path(&self) -> Option<&str> {
        self.result_image
            .as_deref()
            .filter(|p| !p.is_empty())
            .or_else(|| self.analyzed_image.as_deref().filter(|p| !p.is_empty()))
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct DetectedItem {
    #[serde(default, deserialize_with = "lenient")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub count: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    pub nutrition: Option<serde_json::Map<String, serde_json::Value>>,
}

fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

fn lenient_items<'de, D>(deserializer: D) -> Result<Vec<DetectedItem>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    let items = match value {
        serde_json::Value::Array(entries) => entries
            .into_iter()
            .filter_map(|entry| serde_json::from_value(entry).ok())
            .collect(),
        _ => Vec::new(),
    };
    Ok(items)
}

/// One nutrient line of a rendered item, amount already multiplied by the count
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NutrientLine {
    pub nutrient: String,
    pub amount: f64,
    pub unit: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderedItem {
    pub name: String,
    pub count: f64,
    pub lines: Vec<NutrientLine>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NutrientTotal {
    pub nutrient: String,
    pub value: f64,
    pub unit: String,
}

/// Content of the nutrition panel after one analysis
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NutritionPanel {
    NoFoodDetected,
    Items {
        items: Vec<RenderedItem>,
        totals: Vec<NutrientTotal>,
    },
}

/// How one analyze action ended
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisOutcome {
    NoImageSelected,
    ServiceError(String),
    Rendered(NutritionPanel),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mime_type_from_extension() {
        assert_eq!(mime_type_for("meal.PNG"), "image/png");
        assert_eq!(mime_type_for("meal.jpeg"), "image/jpeg");
        assert_eq!(mime_type_for("meal.webp"), "image/webp");
        assert_eq!(mime_type_for("meal"), "image/jpeg");
    }

    #[test]
    fn test_data_url() {
        let payload = ImagePayload::new("a.png", "image/png", vec![1, 2, 3]);
        assert_eq!(payload.data_url(), "data:image/png;base64,AQID");
    }

    #[test]
    fn test_payload_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lunch.jpg");
        std::fs::write(&path, b"jpegbytes").unwrap();

        let payload = ImagePayload::from_path(&path).unwrap();
        assert_eq!(payload.file_name, "lunch.jpg");
        assert_eq!(payload.mime_type, "image/jpeg");
        assert_eq!(payload.bytes, b"jpegbytes");
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(ImagePayload::from_path(&dir.path().join("nope.jpg")).is_err());
    }

    #[test]
    fn test_response_deserialization() {
        let json = r#"{
            "result_image": "static/output/meal.jpg",
            "items": [
                {
                    "name": "banana",
                    "count": 2,
                    "nutrition": {"Calories": "98kcal", "Sugar": "15.8g", "Fiber": 1.7}
                }
            ]
        }"#;

        let response: PredictionResponse = serde_json::from_str(json).unwrap();

        assert!(response.service_error().is_none());
        assert_eq!(response.result_image_path(), Some("static/output/meal.jpg"));
        assert_eq!(response.items.len(), 1);

        let item = &response.items[0];
        assert_eq!(item.name.as_deref(), Some("banana"));
        assert_eq!(item.count, Some(2.0));

        let keys: Vec<&String> = item.nutrition.as_ref().unwrap().keys().collect();
        assert_eq!(keys, ["Calories", "Sugar", "Fiber"]);
    }

    #[test]
    fn test_response_tolerates_wrong_types() {
        let json = r#"{
            "error": 42,
            "items": [
                "not an item",
                {"name": 7, "count": "2", "nutrition": []},
                {"name": "apple", "count": 1, "nutrition": {"Fat": "0.21g"}}
            ]
        }"#;

        let response: PredictionResponse = serde_json::from_str(json).unwrap();

        assert!(response.service_error().is_none());
        assert_eq!(response.items.len(), 2);
        assert!(response.items[0].name.is_none());
        assert!(response.items[0].count.is_none());
        assert!(response.items[0].nutrition.is_none());
        assert_eq!(response.items[1].name.as_deref(), Some("apple"));
    }

    #[test]
    fn test_items_not_an_array() {
        let response: PredictionResponse =
            serde_json::from_str(r#"{"items": {"name": "apple"}}"#).unwrap();
        assert!(response.items.is_empty());
    }

    #[test]
    fn test_error_and_image_fallbacks() {
        let response: PredictionResponse =
            serde_json::from_str(r#"{"error": "", "result_image": "", "analyzed_image": "out/a.jpg"}"#)
                .unwrap();

        assert!(response.service_error().is_none());
        assert_eq!(response.result_image_path(), Some("out/a.jpg"));

        let response: PredictionResponse =
            serde_json::from_str(r#"{"error": "No file uploaded"}"#).unwrap();
        assert_eq!(response.service_error(), Some("No file uploaded"));
    }
}
