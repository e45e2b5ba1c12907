use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{de, Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use tracing::error;

use crate::interfaces::providers::LlmProvider;

const FAILURE_MESSAGE: &str = "generation failed, retry later";
const UNKNOWN_DESTINATION: &str = "unknown";

const SYSTEM_PROMPT: &str = r#"You are a professional travel planning assistant. Based on the user's request, produce a detailed travel plan.

Return the plan as JSON with the following fields:
{
  "destination": "destination",
  "duration": "number of days",
  "budget": "budget",
  "travelers": "number of travelers",
  "preferences": ["preference 1", "preference 2"],
  "itinerary": [
    {
      "day": 1,
      "date": "date",
      "activities": [
        {
          "time": "time",
          "activity": "activity",
          "location": "location",
          "cost": cost,
          "notes": "notes"
        }
      ]
    }
  ],
  "accommodation": [
    {
      "name": "hotel name",
      "location": "location",
      "nights": nights,
      "cost": cost
    }
  ],
  "transportation": {
    "to_destination": {"type": "mode", "cost": cost},
    "local": {"type": "mode", "cost": cost},
    "from_destination": {"type": "mode", "cost": cost}
  },
  "budget_breakdown": {
    "transportation": cost,
    "accommodation": cost,
    "food": cost,
    "activities": cost,
    "shopping": cost,
    "emergency": cost,
    "total": total
  },
  "tips": ["tip 1", "tip 2"]
}"#;

static JSON_SPAN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)\{.*\}").expect("json span pattern"));

fn de_lenient_cost<'de, D>(deserializer: D) -> std::result::Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| {
        v.as_f64()
            .or_else(|| v.as_str().and_then(|s| s.trim().parse().ok()))
    }))
}

fn de_lenient_string<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| match v {
        Value::String(text) => Some(text),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }))
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Activity {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(
        default,
        deserialize_with = "de_lenient_cost",
        skip_serializing_if = "Option::is_none"
    )]
    pub cost: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DayPlan {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub day: Option<i64>,
    #[serde(
        default,
        deserialize_with = "de_lenient_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub date: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub activities: Vec<Activity>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Lodging {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nights: Option<i64>,
    #[serde(
        default,
        deserialize_with = "de_lenient_cost",
        skip_serializing_if = "Option::is_none"
    )]
    pub cost: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransportLeg {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(
        default,
        deserialize_with = "de_lenient_cost",
        skip_serializing_if = "Option::is_none"
    )]
    pub cost: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Transportation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_destination: Option<TransportLeg>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local: Option<TransportLeg>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_destination: Option<TransportLeg>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BudgetBreakdown {
    #[serde(
        default,
        deserialize_with = "de_lenient_cost",
        skip_serializing_if = "Option::is_none"
    )]
    pub total: Option<f64>,
    #[serde(flatten)]
    pub categories: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Itinerary {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
    #[serde(
        default,
        deserialize_with = "de_lenient_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub duration: Option<String>,
    #[serde(
        default,
        deserialize_with = "de_lenient_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub budget: Option<String>,
    #[serde(
        default,
        deserialize_with = "de_lenient_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub travelers: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub preferences: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub itinerary: Vec<DayPlan>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub accommodation: Vec<Lodging>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transportation: Option<Transportation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budget_breakdown: Option<BudgetBreakdown>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tips: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Outcome of one generation round. Serialized untagged, so the stored
/// payload keeps the plain shapes downstream consumers already expect:
/// an itinerary object, `{error, destination, message}` on model
/// failure, or `{raw_response}` when no JSON could be recovered.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum GeneratedPlan {
    Itinerary(Box<Itinerary>),
    Unparsed { raw_response: String },
    Failed {
        error: String,
        destination: String,
        message: String,
    },
}

impl GeneratedPlan {
    pub fn failed(error: impl Into<String>) -> Self {
        Self::Failed {
            error: error.into(),
            destination: UNKNOWN_DESTINATION.to_string(),
            message: FAILURE_MESSAGE.to_string(),
        }
    }

    /// Classifies by discriminating key, never by shape guessing: `error`
    /// marks a failed generation, `raw_response` an unparsed one, and
    /// everything else is read as an itinerary.
    pub fn from_json_value(value: Value) -> Self {
        let Some(object) = value.as_object() else {
            return Self::Unparsed {
                raw_response: value.to_string(),
            };
        };

        if object.contains_key("error") {
            return Self::Failed {
                error: text_field(object, "error"),
                destination: object
                    .get("destination")
                    .and_then(|v| v.as_str())
                    .unwrap_or(UNKNOWN_DESTINATION)
                    .to_string(),
                message: object
                    .get("message")
                    .and_then(|v| v.as_str())
                    .unwrap_or(FAILURE_MESSAGE)
                    .to_string(),
            };
        }

        if object.contains_key("raw_response") {
            return Self::Unparsed {
                raw_response: text_field(object, "raw_response"),
            };
        }

        match serde_json::from_value::<Itinerary>(value.clone()) {
            Ok(itinerary) => Self::Itinerary(Box::new(itinerary)),
            // Valid JSON that resists the typed shape is still a plan,
            // not a failure; carry the whole object through untouched.
            Err(_) => Self::Itinerary(Box::new(Itinerary {
                extra: object.clone(),
                ..Itinerary::default()
            })),
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

impl<'de> Deserialize<'de> for GeneratedPlan {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        if value.is_null() {
            return Err(de::Error::custom("generated plan cannot be null"));
        }
        Ok(Self::from_json_value(value))
    }
}

fn text_field(object: &Map<String, Value>, key: &str) -> String {
    match object.get(key) {
        Some(Value::String(text)) => text.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}

/// Turns a free-text trip request into a structured plan. Infallible by
/// contract: model or parse failures degrade to the tagged fallback
/// variants instead of surfacing an error.
pub struct PlanGenerator {
    llm: Arc<dyn LlmProvider>,
}

impl PlanGenerator {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self { llm }
    }

    pub async fn generate(&self, user_input: &str) -> GeneratedPlan {
        match self.llm.complete(SYSTEM_PROMPT, user_input).await {
            Ok(text) => Self::parse_plan(&text),
            Err(e) => {
                error!("plan generation failed: {e}");
                GeneratedPlan::failed(e.to_string())
            }
        }
    }

    /// Two-stage parse: strict first, then a best-effort scan for the
    /// widest `{...}` span (models like to wrap JSON in prose or fences).
    fn parse_plan(text: &str) -> GeneratedPlan {
        if let Ok(value) = serde_json::from_str::<Value>(text) {
            if value.is_object() {
                return GeneratedPlan::from_json_value(value);
            }
        }

        if let Some(span) = JSON_SPAN.find(text) {
            if let Ok(value) = serde_json::from_str::<Value>(span.as_str()) {
                if value.is_object() {
                    return GeneratedPlan::from_json_value(value);
                }
            }
        }

        GeneratedPlan::Unparsed {
            raw_response: text.to_string(),
        }
    }
}
