use reqwest::Client as HttpClient;
use shared::{NutritionAttachment, NutritionRecord, UploadResponse};

use crate::clients::nutrition::{NutritionClient, NutritionError};
use crate::clients::recognition::{RecognitionClient, RecognitionError};
use crate::config::AppConfig;
use crate::storage::upload_service::{FileUpload, IntakeError, UploadService};

#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error(transparent)]
    Intake(#[from] IntakeError),
    #[error(transparent)]
    Recognition(#[from] RecognitionError),
    #[error("No food items detected in the image")]
    NoDetections,
    #[error(transparent)]
    Nutrition(#[from] NutritionError),
}

/// Upload → recognition → (optional) nutrition, and the standalone nutrition lookup.
#[derive(Clone)]
pub struct AnalysisService {
    uploads: UploadService,
    recognition: RecognitionClient,
    nutrition: NutritionClient,
}

impl AnalysisService {
    pub fn new(
        uploads: UploadService,
        recognition: RecognitionClient,
        nutrition: NutritionClient,
    ) -> Self {
        Self {
            uploads,
            recognition,
            nutrition,
        }
    }

    pub fn from_config(http_client: HttpClient, config: &AppConfig) -> Self {
        Self::new(
            UploadService::new(&config.uploads, &config.static_dir),
            RecognitionClient::new(http_client.clone(), &config.recognition),
            NutritionClient::new(http_client, &config.nutrition),
        )
    }

    pub fn uploads(&self) -> &UploadService {
        &self.uploads
    }

    pub async fn analyze_upload(
        &self,
        upload: FileUpload,
        include_nutrition: bool,
    ) -> Result<UploadResponse, AnalysisError> {
        let image = self.uploads.store(upload).await?;
        log::info!(
            "Stored upload {:?} (sanitized {:?}) as {} ({} bytes)",
            image.original_name,
            image.sanitized_name,
            image.stored_name,
            image.size
        );
        let predictions = self.recognition.analyze_image(&image.path).await?;

        let Some(top) = predictions.first() else {
            log::warn!("No food items detected in {}", image.path.display());
            return Err(AnalysisError::NoDetections);
        };

        let nutrition = if include_nutrition {
            Some(self.attach_nutrition(&top.name).await)
        } else {
            None
        };

        Ok(UploadResponse {
            predictions,
            image_path: image.image_path,
            nutrition,
        })
    }

    pub async fn lookup_nutrition(&self, food_name: &str) -> Result<NutritionRecord, AnalysisError> {
        Ok(self.nutrition.lookup(food_name).await?)
    }

    // A failed lookup never fails the upload; the message rides along instead.
    async fn attach_nutrition(&self, food_name: &str) -> NutritionAttachment {
        match self.nutrition.lookup(food_name).await {
            Ok(record) => NutritionAttachment {
                nutrition: Some(record),
                nutrition_error: None,
            },
            Err(e) => {
                log::warn!("Nutrition lookup for {:?} failed: {}", food_name, e);
                NutritionAttachment {
                    nutrition: None,
                    nutrition_error: Some(e.to_string()),
                }
            }
        }
    }
}
