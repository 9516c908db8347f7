use reqwest::{Client as HttpClient, StatusCode};
use serde::Deserialize;
use shared::{NutrientEntry, NutritionRecord, RecognizedNutrient};

use crate::config::NutritionConfig;

#[derive(Debug, thiserror::Error)]
pub enum NutritionError {
    #[error("USDA API error: {status}")]
    SearchFailed { status: u16, body: String },
    #[error("Error getting detailed nutrition data: {status}")]
    DetailFailed { status: u16, body: String },
    #[error("No nutrition data found for this food item")]
    NotFound,
    #[error("Error getting nutrition data: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Error getting nutrition data: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    foods: Vec<SearchFood>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchFood {
    fdc_id: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FoodDetail {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub food_nutrients: Vec<FoodNutrient>,
}

#[derive(Debug, Deserialize)]
pub struct FoodNutrient {
    #[serde(default)]
    pub nutrient: Option<NutrientInfo>,
    #[serde(default)]
    pub amount: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NutrientInfo {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub unit_name: Option<String>,
}

/// Client for USDA FoodData Central: a one-result search to resolve the FDC ID,
/// then a detail fetch for the nutrient list.
#[derive(Clone)]
pub struct NutritionClient {
    http_client: HttpClient,
    base_url: String,
    api_key: String,
}

impl NutritionClient {
    pub fn new(http_client: HttpClient, config: &NutritionConfig) -> Self {
        Self {
            http_client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        }
    }

    pub async fn lookup(&self, food_name: &str) -> Result<NutritionRecord, NutritionError> {
        let fdc_id = self
            .search_food(food_name)
            .await?
            .ok_or(NutritionError::NotFound)?;
        let detail = self.get_food_detail(fdc_id).await?;
        let nutrients = extract_nutrients(&detail.food_nutrients);

        log::info!(
            "Found {} matching nutrients for {:?} (FDC {})",
            nutrients.len(),
            food_name,
            fdc_id
        );

        Ok(NutritionRecord {
            name: detail.description.unwrap_or_else(|| food_name.to_string()),
            nutrients,
        })
    }

    async fn search_food(&self, query: &str) -> Result<Option<u64>, NutritionError> {
        let url = format!("{}/foods/search", self.base_url);

        let response = self
            .http_client
            .get(&url)
            .query(&[
                ("query", query),
                ("api_key", self.api_key.as_str()),
                ("pageSize", "1"),
            ])
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await?;
            log::error!("USDA search for {:?} failed with {}: {}", query, status, body);
            return Err(NutritionError::SearchFailed {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.bytes().await?;
        let search: SearchResponse = serde_json::from_slice(&body)?;
        Ok(search.foods.first().map(|food| food.fdc_id))
    }

    async fn get_food_detail(&self, fdc_id: u64) -> Result<FoodDetail, NutritionError> {
        let url = format!("{}/food/{}", self.base_url, fdc_id);

        let response = self
            .http_client
            .get(&url)
            .query(&[("api_key", self.api_key.as_str())])
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await?;
            log::error!("USDA detail for FDC {} failed with {}: {}", fdc_id, status, body);
            return Err(NutritionError::DetailFailed {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }
}

/// Keeps only recognized nutrients, in the order the detail record lists them.
pub fn extract_nutrients(food_nutrients: &[FoodNutrient]) -> Vec<NutrientEntry> {
    food_nutrients
        .iter()
        .filter_map(|entry| {
            let info = entry.nutrient.as_ref()?;
            let recognized = RecognizedNutrient::from_usda_name(info.name.as_deref()?)?;
            Some(NutrientEntry {
                name: recognized.usda_name().to_string(),
                amount: entry.amount.unwrap_or(0.0),
                unit: info
                    .unit_name
                    .clone()
                    .unwrap_or_else(|| recognized.default_unit().to_string()),
            })
        })
        .collect()
}
