use serde::{Deserialize, Serialize};
use strum_macros::{EnumIter, EnumString, IntoStaticStr};

/// A labeled concept returned by the image classifier, confidence in percent.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Prediction {
    pub name: String,
    pub confidence: f64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct NutrientEntry {
    pub name: String,
    pub amount: f64,
    pub unit: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct NutritionRecord {
    pub name: String,
    pub nutrients: Vec<NutrientEntry>,
}

/// Nutrition result attached to an upload when the lookup is chained.
/// Exactly one of the two fields is set; both keys are always serialized.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct NutritionAttachment {
    pub nutrition: Option<NutritionRecord>,
    pub nutrition_error: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct UploadResponse {
    pub predictions: Vec<Prediction>,
    pub image_path: String,
    #[serde(flatten, skip_serializing_if = "Option::is_none")]
    pub nutrition: Option<NutritionAttachment>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ErrorResponse {
    pub error: String,
}

/// The nutrients reported to callers, keyed by their FoodData Central names.
/// Anything else present upstream is dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, EnumIter, IntoStaticStr)]
pub enum RecognizedNutrient {
    #[strum(serialize = "Energy")]
    Energy,
    #[strum(serialize = "Protein")]
    Protein,
    #[strum(serialize = "Total lipid (fat)")]
    TotalFat,
    #[strum(serialize = "Carbohydrate, by difference")]
    Carbohydrate,
    #[strum(serialize = "Fiber, total dietary")]
    Fiber,
    #[strum(serialize = "Sugars, total including NLEA")]
    Sugars,
    #[strum(serialize = "Sodium, Na")]
    Sodium,
    #[strum(serialize = "Calcium, Ca")]
    Calcium,
    #[strum(serialize = "Iron, Fe")]
    Iron,
    #[strum(serialize = "Potassium, K")]
    Potassium,
    #[strum(serialize = "Vitamin C, total ascorbic acid")]
    VitaminC,
    #[strum(serialize = "Vitamin A, RAE")]
    VitaminA,
    #[strum(serialize = "Saturated fatty acids, total")]
    SaturatedFat,
    #[strum(serialize = "Cholesterol")]
    Cholesterol,
    #[strum(serialize = "Magnesium, Mg")]
    Magnesium,
    #[strum(serialize = "Phosphorus, P")]
    Phosphorus,
    #[strum(serialize = "Zinc, Zn")]
    Zinc,
}

impl RecognizedNutrient {
    /// Exact, case-sensitive match against the upstream nutrient name.
    pub fn from_usda_name(name: &str) -> Option<Self> {
        name.parse().ok()
    }

    pub fn usda_name(self) -> &'static str {
        self.into()
    }

    /// Unit used when the upstream record leaves `unitName` out.
    pub fn default_unit(self) -> &'static str {
        match self {
            RecognizedNutrient::Energy => "kcal",
            RecognizedNutrient::VitaminA => "µg",
            RecognizedNutrient::Protein
            | RecognizedNutrient::TotalFat
            | RecognizedNutrient::Carbohydrate
            | RecognizedNutrient::Fiber
            | RecognizedNutrient::Sugars
            | RecognizedNutrient::SaturatedFat => "g",
            RecognizedNutrient::Sodium
            | RecognizedNutrient::Calcium
            | RecognizedNutrient::Iron
            | RecognizedNutrient::Potassium
            | RecognizedNutrient::VitaminC
            | RecognizedNutrient::Cholesterol
            | RecognizedNutrient::Magnesium
            | RecognizedNutrient::Phosphorus
            | RecognizedNutrient::Zinc => "mg",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn recognized_set_has_seventeen_names() {
        assert_eq!(RecognizedNutrient::iter().count(), 17);
        for nutrient in RecognizedNutrient::iter() {
            assert_eq!(
                RecognizedNutrient::from_usda_name(nutrient.usda_name()),
                Some(nutrient)
            );
        }
    }

    #[test]
    fn nutrient_names_match_exactly() {
        assert_eq!(
            RecognizedNutrient::from_usda_name("Total lipid (fat)"),
            Some(RecognizedNutrient::TotalFat)
        );
        assert_eq!(RecognizedNutrient::from_usda_name("energy"), None);
        assert_eq!(RecognizedNutrient::from_usda_name("Energy "), None);
        assert_eq!(RecognizedNutrient::from_usda_name("Caffeine"), None);
    }

    #[test]
    fn default_units() {
        assert_eq!(RecognizedNutrient::Energy.default_unit(), "kcal");
        assert_eq!(RecognizedNutrient::VitaminA.default_unit(), "µg");
        assert_eq!(RecognizedNutrient::Protein.default_unit(), "g");
        assert_eq!(RecognizedNutrient::Zinc.default_unit(), "mg");
    }

    #[test]
    fn upload_response_without_nutrition_omits_keys() {
        let response = UploadResponse {
            predictions: vec![Prediction {
                name: "pizza".into(),
                confidence: 94.32,
            }],
            image_path: "static/uploads/pizza.jpg".into(),
            nutrition: None,
        };

        let value = serde_json::to_value(&response).unwrap();
        let object = value.as_object().unwrap();
        assert!(!object.contains_key("nutrition"));
        assert!(!object.contains_key("nutrition_error"));
        assert_eq!(value["predictions"][0]["name"], "pizza");
    }

    #[test]
    fn upload_response_with_nutrition_error_keeps_both_keys() {
        let response = UploadResponse {
            predictions: vec![],
            image_path: "static/uploads/x.png".into(),
            nutrition: Some(NutritionAttachment {
                nutrition: None,
                nutrition_error: Some("No nutrition data found for this food item".into()),
            }),
        };

        let value = serde_json::to_value(&response).unwrap();
        assert!(value.as_object().unwrap().contains_key("nutrition"));
        assert!(value["nutrition"].is_null());
        assert_eq!(
            value["nutrition_error"],
            "No nutrition data found for this food item"
        );
    }
}
