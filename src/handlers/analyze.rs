use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::models::{AnalysisOutcome, ImagePayload, NutritionPanel, Preview, PredictionResponse};
use crate::services::camera::{snapshot_payload, Camera};
use crate::services::nutrition::build_panel;
use crate::services::prediction::result_image_path;
use crate::services::{PredictionService, ResultView};

pub const NO_IMAGE_ALERT: &str = "Please upload or take a photo first!";
pub const CAMERA_ALERT: &str = "Camera access denied or unavailable.";

/// Drives one analysis: choose an image, send it, show what comes back
pub struct AnalyzeHandler {
    predictor: Arc<dyn PredictionService>,
    view: Arc<dyn ResultView>,
    selected: Mutex<Option<ImagePayload>>,
    result_image: std::sync::Mutex<Option<String>>,
    capture_delay: Duration,
    jpeg_quality: u8,
}

impl AnalyzeHandler {
    pub fn new(
        predictor: Arc<dyn PredictionService>,
        view: Arc<dyn ResultView>,
        capture_delay: Duration,
        jpeg_quality: u8,
    ) -> Self {
        Self {
            predictor,
            view,
            selected: Mutex::new(None),
            result_image: std::sync::Mutex::new(None),
            capture_delay,
            jpeg_quality,
        }
    }

    /// Image currently waiting to be analyzed
    pub async fn selected(&self) -> Option<ImagePayload> {
        self.selected.lock().await.clone()
    }

    /// Use an image file from disk and preview it
    pub async fn select_file(&self, path: &Path) -> Result<()> {
        let payload = ImagePayload::from_path(path)?;
        log::info!("🖼️ Selected {} ({} bytes)", payload.file_name, payload.bytes.len());
        self.select(payload).await;
        Ok(())
    }

    async fn select(&self, payload: ImagePayload) {
        self.view.show_preview(&Preview::Inline {
            file_name: payload.file_name.clone(),
            data_url: payload.data_url(),
        });
        *self.selected.lock().await = Some(payload);
    }

    /// Open the camera, wait the capture delay, snap a photo and select it.
    ///
    /// Returns false when the camera could not be used; the user has been told
    /// and the previous selection is kept.
    pub async fn capture_from_camera(&self, camera: &dyn Camera) -> bool {
        let stream = match camera.open().await {
            Ok(stream) => stream,
            Err(e) => {
                log::error!("❌ Camera error: {:#}", anyhow::Error::from(e));
                self.view.alert(CAMERA_ALERT);
                return false;
            }
        };

        self.view.show_preview(&Preview::LiveCamera {
            device: stream.device().to_string(),
        });
        tokio::time::sleep(self.capture_delay).await;

        let payload = match stream
            .capture()
            .await
            .and_then(|frame| snapshot_payload(&frame, self.jpeg_quality))
        {
            Ok(payload) => payload,
            Err(e) => {
                log::error!("❌ Camera snapshot failed: {:#}", anyhow::Error::from(e));
                self.view.alert(CAMERA_ALERT);
                return false;
            }
        };

        log::info!("📸 Camera snapshot taken ({} bytes)", payload.bytes.len());
        self.select(payload).await;
        true
    }

    /// Send the selected image to the prediction service and render the answer
    pub async fn analyze(&self) -> Result<AnalysisOutcome> {
        let Some(image) = self.selected().await else {
            log::warn!("⚠️ Analyze requested without an image");
            self.view.alert(NO_IMAGE_ALERT);
            return Ok(AnalysisOutcome::NoImageSelected);
        };

        let response = self.predictor.predict(&image).await?;
        Ok(self.present(&response, chrono::Utc::now().timestamp_millis()))
    }

    /// Render a prediction response; `timestamp_ms` busts caches on the result image
    pub fn present(&self, response: &PredictionResponse, timestamp_ms: i64) -> AnalysisOutcome {
        *self.result_image.lock().unwrap_or_else(|e| e.into_inner()) = None;

        if let Some(error) = response.service_error() {
            log::error!("❌ Prediction service error: {}", error);
            self.view.alert(error);
            return AnalysisOutcome::ServiceError(error.to_string());
        }

        if let Some(path) = response.result_image_path() {
            *self.result_image.lock().unwrap_or_else(|e| e.into_inner()) = Some(path.to_string());
            let url = self.predictor.resolve_url(&result_image_path(path, timestamp_ms));
            self.view.show_preview(&Preview::Remote { url });
        }

        let panel = build_panel(&response.items);
        match &panel {
            NutritionPanel::NoFoodDetected => log::info!("🍽️ No food detected"),
            NutritionPanel::Items { items, totals } => log::info!(
                "🍽️ Rendered {} item(s), {} total(s)",
                items.len(),
                totals.len()
            ),
        }
        self.view.show_nutrition(&panel);

        AnalysisOutcome::Rendered(panel)
    }

    /// Download the annotated image of the last analysis. Returns false if there was none.
    pub async fn save_result_image(&self, destination: &Path) -> Result<bool> {
        let path = self.result_image.lock().unwrap_or_else(|e| e.into_inner()).clone();
        let Some(path) = path else {
            log::warn!("⚠️ No analyzed image to save");
            return Ok(false);
        };

        let bytes = self.predictor.download(&path).await?;
        std::fs::write(destination, &bytes)?;
        log::info!("💾 Analyzed image saved to {} ({} bytes)", destination.display(), bytes.len());
        Ok(true)
    }
}
