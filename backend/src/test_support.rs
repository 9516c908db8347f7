//! In-process stand-ins for Clarifai and FoodData Central.

use actix_web::{App, HttpRequest, HttpResponse, HttpServer, web};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::{Value, json};
use shared::{NutrientEntry, NutritionRecord, Prediction};
use std::collections::HashMap;
use std::path::Path;

use crate::config::{AppConfig, NamingPolicy, NutritionConfig, RecognitionConfig};

pub const CLARIFAI_TEST_KEY: &str = "clarifai-test-key";
pub const USDA_TEST_KEY: &str = "usda-test-key";
pub const CLARIFAI_OUTPUTS_PATH: &str = "/v2/models/food-item-recognition/outputs";

/// Binds an upstream stub on an ephemeral port and returns its base URL.
pub async fn spawn_upstream<F>(configure: F) -> String
where
    F: Fn(&mut web::ServiceConfig) + Clone + Send + 'static,
{
    let server = HttpServer::new(move || App::new().configure(configure.clone()))
        .workers(1)
        .bind(("127.0.0.1", 0))
        .expect("bind upstream stub");
    let address = server.addrs()[0];
    actix_web::rt::spawn(server.run());
    format!("http://{}", address)
}

pub fn clarifai_config(base_url: &str) -> RecognitionConfig {
    RecognitionConfig {
        endpoint: format!("{}{}", base_url, CLARIFAI_OUTPUTS_PATH),
        api_key: CLARIFAI_TEST_KEY.to_string(),
        ..RecognitionConfig::default()
    }
}

pub fn usda_config(base_url: &str) -> NutritionConfig {
    NutritionConfig {
        base_url: base_url.to_string(),
        api_key: USDA_TEST_KEY.to_string(),
    }
}

pub fn app_config(clarifai_url: &str, usda_url: &str, root: &Path) -> AppConfig {
    let mut config = AppConfig {
        recognition: clarifai_config(clarifai_url),
        nutrition: usda_config(usda_url),
        static_dir: root.join("static"),
        ..AppConfig::default()
    };
    config.uploads.dir = root.join("static").join("uploads");
    config.uploads.naming = NamingPolicy::ContentHash;
    config
}

/// Image bytes the Clarifai stub recognises; anything else is treated as pizza.
pub mod images {
    pub const EMPTY_PLATE: &[u8] = b"empty plate";
    pub const GARBAGE: &[u8] = b"garbage";
    pub const OUTAGE: &[u8] = b"upstream down";
    pub const SUSHI: &[u8] = b"sushi";
    pub const MOON_ROCK: &[u8] = b"moon rock";
}

pub fn clarifai_routes(cfg: &mut web::ServiceConfig) {
    cfg.route(CLARIFAI_OUTPUTS_PATH, web::post().to(clarifai_outputs));
}

fn concepts(pairs: &[(&str, f64)]) -> Value {
    let concepts: Vec<Value> = pairs
        .iter()
        .map(|(name, value)| json!({"id": format!("ai_{name}"), "name": name, "value": value}))
        .collect();
    json!({
        "status": {"code": 10000, "description": "Ok"},
        "outputs": [{"data": {"concepts": concepts}}]
    })
}

async fn clarifai_outputs(req: HttpRequest, body: web::Json<Value>) -> HttpResponse {
    let authorized = req
        .headers()
        .get("Authorization")
        .and_then(|value| value.to_str().ok())
        == Some(format!("Key {}", CLARIFAI_TEST_KEY).as_str());
    if !authorized {
        return HttpResponse::Unauthorized()
            .json(json!({"status": {"code": 11102, "description": "Invalid API key"}}));
    }

    let encoded = body["inputs"][0]["data"]["image"]["base64"]
        .as_str()
        .unwrap_or_default();
    let image = STANDARD.decode(encoded).unwrap_or_default();

    match image.as_slice() {
        images::EMPTY_PLATE => HttpResponse::Ok().json(json!({"outputs": [{"data": {}}]})),
        images::GARBAGE => HttpResponse::Ok()
            .content_type("application/json")
            .body("<html>not json</html>"),
        images::OUTAGE => HttpResponse::ServiceUnavailable().body("service unavailable"),
        images::SUSHI => HttpResponse::Ok().json(concepts(&[("sushi", 0.97), ("rice", 0.9)])),
        images::MOON_ROCK => HttpResponse::Ok().json(concepts(&[("moon rocks", 0.51)])),
        _ => HttpResponse::Ok().json(concepts(&[
            ("pizza", 0.943210),
            ("cheese", 0.881234),
            ("dough", 0.75),
            ("tomato", 0.6),
            ("basil", 0.5557),
            ("crust", 0.4),
            ("oregano", 0.3),
        ])),
    }
}

pub fn pizza_predictions() -> Vec<Prediction> {
    [
        ("pizza", 94.32),
        ("cheese", 88.12),
        ("dough", 75.0),
        ("tomato", 60.0),
        ("basil", 55.57),
    ]
    .into_iter()
    .map(|(name, confidence)| Prediction {
        name: name.to_string(),
        confidence,
    })
    .collect()
}

pub fn usda_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/foods/search", web::get().to(usda_search))
        .route("/food/{fdc_id}", web::get().to(usda_detail));
}

async fn usda_search(query: web::Query<HashMap<String, String>>) -> HttpResponse {
    if query.get("api_key").map(String::as_str) != Some(USDA_TEST_KEY) {
        return HttpResponse::Forbidden().json(json!({"error": {"code": "API_KEY_INVALID"}}));
    }
    if query.get("pageSize").map(String::as_str) != Some("1") {
        return HttpResponse::BadRequest().body("pageSize must be 1");
    }

    let foods = match query.get("query").map(String::as_str) {
        Some("pizza") => json!([{"fdcId": 101, "description": "Pizza, cheese"}]),
        Some("mystery stew") => json!([{"fdcId": 202}]),
        Some("sushi") => json!([{"fdcId": 303, "description": "Sushi"}]),
        _ => json!([]),
    };
    HttpResponse::Ok().json(json!({"totalHits": foods.as_array().map_or(0, Vec::len), "foods": foods}))
}

async fn usda_detail(path: web::Path<u64>, query: web::Query<HashMap<String, String>>) -> HttpResponse {
    if query.get("api_key").map(String::as_str) != Some(USDA_TEST_KEY) {
        return HttpResponse::Forbidden().finish();
    }

    match path.into_inner() {
        101 => HttpResponse::Ok().json(json!({
            "fdcId": 101,
            "description": "Pizza, cheese",
            "foodNutrients": [
                {"nutrient": {"id": 1008, "name": "Energy", "unitName": "kcal"}, "amount": 266.0},
                {"nutrient": {"id": 1051, "name": "Water", "unitName": "g"}, "amount": 48.0},
                {"nutrient": {"id": 1003, "name": "Protein", "unitName": "g"}, "amount": 11.4},
                {"nutrient": {"id": 1004, "name": "Total lipid (fat)"}, "amount": 10.4},
                {"nutrient": {"id": 1057, "name": "Caffeine", "unitName": "mg"}, "amount": 0.0},
                {"nutrient": {"id": 1093, "name": "Sodium, Na", "unitName": "mg"}},
                {"nutrient": {"id": 1106, "name": "Vitamin A, RAE"}, "amount": 71.0}
            ]
        })),
        202 => HttpResponse::Ok().json(json!({"fdcId": 202, "foodNutrients": []})),
        _ => HttpResponse::InternalServerError().body("detail backend exploded"),
    }
}

pub fn pizza_nutrition() -> NutritionRecord {
    let entry = |name: &str, amount: f64, unit: &str| NutrientEntry {
        name: name.to_string(),
        amount,
        unit: unit.to_string(),
    };
    NutritionRecord {
        name: "Pizza, cheese".to_string(),
        nutrients: vec![
            entry("Energy", 266.0, "kcal"),
            entry("Protein", 11.4, "g"),
            entry("Total lipid (fat)", 10.4, "g"),
            entry("Sodium, Na", 0.0, "mg"),
            entry("Vitamin A, RAE", 71.0, "µg"),
        ],
    }
}
