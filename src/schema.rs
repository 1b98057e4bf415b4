//! Request schema and canonical feature order

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Number, Value};
use validator::Validate;

use crate::error::FieldError;
use crate::extract::Payload;

/// Column holding the client identifier in the reference dataset
pub const CLIENT_ID_FIELD: &str = "SK_ID_CURR";

pub const FEATURE_COUNT: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FeatureKind {
    Float,
    Int,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct FeatureSpec {
    pub name: &'static str,
    #[serde(rename = "type")]
    pub kind: FeatureKind,
    pub description: &'static str,
}

/// Features in training-time order. Vector construction, attribution
/// output and display all follow this order.
pub const FEATURES: [FeatureSpec; FEATURE_COUNT] = [
    FeatureSpec {
        name: "EXT_SOURCE_3",
        kind: FeatureKind::Float,
        description: "Normalized external score 3",
    },
    FeatureSpec {
        name: "EXT_SOURCE_2",
        kind: FeatureKind::Float,
        description: "Normalized external score 2",
    },
    FeatureSpec {
        name: "EXT_SOURCE_1",
        kind: FeatureKind::Float,
        description: "Normalized external score 1",
    },
    FeatureSpec {
        name: "REG_CITY_NOT_WORK_CITY",
        kind: FeatureKind::Int,
        description: "1 if the client does not work in their city of residence",
    },
    FeatureSpec {
        name: "DAYS_ID_PUBLISH",
        kind: FeatureKind::Int,
        description: "Days since the identity document was issued (negative)",
    },
    FeatureSpec {
        name: "DAYS_LAST_PHONE_CHANGE",
        kind: FeatureKind::Float,
        description: "Days since the last phone change (negative)",
    },
    FeatureSpec {
        name: "REGION_RATING_CLIENT",
        kind: FeatureKind::Int,
        description: "Rating of the client's region (1-3)",
    },
    FeatureSpec {
        name: "REGION_RATING_CLIENT_W_CITY",
        kind: FeatureKind::Int,
        description: "Rating of the client's region weighted by city (1-3)",
    },
    FeatureSpec {
        name: "DAYS_EMPLOYED",
        kind: FeatureKind::Float,
        description: "Days employed at the current job (negative)",
    },
    FeatureSpec {
        name: "DAYS_BIRTH",
        kind: FeatureKind::Int,
        description: "Client age in days (negative)",
    },
];

pub fn feature_names() -> impl Iterator<Item = &'static str> {
    FEATURES.iter().map(|f| f.name)
}

pub fn feature_index(name: &str) -> Option<usize> {
    FEATURES.iter().position(|f| f.name == name)
}

/// Converts a feature value to JSON, keeping integer-kind features integral.
/// Missing values (NaN) become `null`.
pub fn feature_value_json(kind: FeatureKind, value: f64) -> Value {
    if !value.is_finite() {
        return Value::Null;
    }
    match kind {
        FeatureKind::Int if value.fract() == 0.0 => Value::from(value as i64),
        _ => serde_json::Number::from_f64(value)
            .map(Value::Number)
            .unwrap_or(Value::Null),
    }
}

/// Maps a row in canonical order to `{feature_name: value}`.
pub fn feature_map(row: &[f64]) -> Map<String, Value> {
    FEATURES
        .iter()
        .zip(row)
        .map(|(spec, &v)| (spec.name.to_string(), feature_value_json(spec.kind, v)))
        .collect()
}

/// Every key must be present; `null` marks a missing value that the
/// model's imputer fills in.
fn required<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer)
}

/// Integer value of a JSON number with no fractional part (`2`, `2.0`)
pub fn as_integral(number: &Number) -> Option<i64> {
    number.as_i64().or_else(|| {
        let x = number.as_f64()?;
        (x.is_finite() && x.fract() == 0.0 && x.abs() < 9.0e15).then_some(x as i64)
    })
}

/// Like [`required`] for integer-kind features, also accepting integral floats
fn integral<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(number) = Option::<Number>::deserialize(deserializer)? else {
        return Ok(None);
    };
    as_integral(&number)
        .map(Some)
        .ok_or_else(|| D::Error::custom(format!("expected an integer, found {number}")))
}

/// Scoring request payload
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CustomerFeatures {
    #[serde(rename = "EXT_SOURCE_3", deserialize_with = "required")]
    #[validate(range(min = 0.0, max = 1.0))]
    pub ext_source_3: Option<f64>,

    #[serde(rename = "EXT_SOURCE_2", deserialize_with = "required")]
    #[validate(range(min = 0.0, max = 1.0))]
    pub ext_source_2: Option<f64>,

    #[serde(rename = "EXT_SOURCE_1", deserialize_with = "required")]
    #[validate(range(min = 0.0, max = 1.0))]
    pub ext_source_1: Option<f64>,

    #[serde(rename = "REG_CITY_NOT_WORK_CITY", deserialize_with = "integral")]
    #[validate(range(min = 0, max = 1))]
    pub reg_city_not_work_city: Option<i64>,

    #[serde(rename = "DAYS_ID_PUBLISH", deserialize_with = "integral")]
    #[validate(range(max = 0))]
    pub days_id_publish: Option<i64>,

    #[serde(rename = "DAYS_LAST_PHONE_CHANGE", deserialize_with = "required")]
    #[validate(range(max = 0.0))]
    pub days_last_phone_change: Option<f64>,

    #[serde(rename = "REGION_RATING_CLIENT", deserialize_with = "integral")]
    #[validate(range(min = 1, max = 3))]
    pub region_rating_client: Option<i64>,

    #[serde(rename = "REGION_RATING_CLIENT_W_CITY", deserialize_with = "integral")]
    #[validate(range(min = 1, max = 3))]
    pub region_rating_client_w_city: Option<i64>,

    // 365243 marks pensioners in the source data, so no upper bound here
    #[serde(rename = "DAYS_EMPLOYED", deserialize_with = "required")]
    pub days_employed: Option<f64>,

    #[serde(rename = "DAYS_BIRTH", deserialize_with = "integral")]
    #[validate(range(max = 0))]
    pub days_birth: Option<i64>,
}

impl CustomerFeatures {
    /// Feature vector in canonical order, NaN for missing values
    pub fn to_vector(&self) -> [f64; FEATURE_COUNT] {
        let int = |v: Option<i64>| v.map(|x| x as f64).unwrap_or(f64::NAN);
        let float = |v: Option<f64>| v.unwrap_or(f64::NAN);
        [
            float(self.ext_source_3),
            float(self.ext_source_2),
            float(self.ext_source_1),
            int(self.reg_city_not_work_city),
            int(self.days_id_publish),
            float(self.days_last_phone_change),
            int(self.region_rating_client),
            int(self.region_rating_client_w_city),
            float(self.days_employed),
            int(self.days_birth),
        ]
    }

    pub fn to_feature_map(&self) -> Map<String, Value> {
        feature_map(&self.to_vector())
    }
}

impl Payload for CustomerFeatures {
    /// One error per canonical key that is absent or holds neither a
    /// number nor `null`. Integer-kind keys also reject fractional numbers.
    fn field_errors(body: &Value) -> Vec<FieldError> {
        let Some(map) = body.as_object() else {
            return vec![FieldError {
                field: "body".to_string(),
                message: "expected a JSON object".to_string(),
            }];
        };

        FEATURES
            .iter()
            .filter_map(|spec| {
                let message = match (map.get(spec.name), spec.kind) {
                    (None, _) => "field required",
                    (Some(Value::Null), _) => return None,
                    (Some(Value::Number(n)), FeatureKind::Int) if as_integral(n).is_none() => {
                        "expected an integer"
                    }
                    (Some(Value::Number(_)), _) => return None,
                    (Some(_), FeatureKind::Int) => "expected an integer",
                    (Some(_), FeatureKind::Float) => "expected a number",
                };
                Some(FieldError {
                    field: spec.name.to_string(),
                    message: message.to_string(),
                })
            })
            .collect()
    }
}

/// Canonical feature name for a validator field name
pub fn canonical_field_name(field: &str) -> String {
    FEATURES
        .iter()
        .find(|f| f.name.eq_ignore_ascii_case(field))
        .map(|f| f.name.to_string())
        .unwrap_or_else(|| field.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_payload() -> Value {
        json!({
            "EXT_SOURCE_3": 0.45,
            "EXT_SOURCE_2": 0.62,
            "EXT_SOURCE_1": 0.75,
            "REG_CITY_NOT_WORK_CITY": 1,
            "DAYS_ID_PUBLISH": -500,
            "DAYS_LAST_PHONE_CHANGE": -300.5,
            "REGION_RATING_CLIENT": 2,
            "REGION_RATING_CLIENT_W_CITY": 2,
            "DAYS_EMPLOYED": -2000,
            "DAYS_BIRTH": -12000
        })
    }

    #[test]
    fn test_vector_follows_canonical_order() {
        let features: CustomerFeatures = serde_json::from_value(sample_payload()).unwrap();
        let v = features.to_vector();
        assert_eq!(v[0], 0.45);
        assert_eq!(v[5], -300.5);
        assert_eq!(v[9], -12000.0);
        assert!(features.validate().is_ok());
    }

    #[test]
    fn test_missing_key_is_rejected() {
        let err = serde_json::from_value::<CustomerFeatures>(json!({"DAYS_BIRTH": -15000}));
        assert!(err.is_err());
    }

    #[test]
    fn test_integral_floats_accepted_for_int_features() {
        let mut payload = sample_payload();
        payload["DAYS_BIRTH"] = json!(-12000.0);
        payload["REGION_RATING_CLIENT"] = json!(2.0);
        let features: CustomerFeatures = serde_json::from_value(payload).unwrap();
        assert_eq!(features.days_birth, Some(-12000));
        assert_eq!(features.region_rating_client, Some(2));
        assert!(CustomerFeatures::field_errors(&sample_payload()).is_empty());

        let mut fractional = sample_payload();
        fractional["REGION_RATING_CLIENT"] = json!(2.5);
        assert!(serde_json::from_value::<CustomerFeatures>(fractional.clone()).is_err());
        let errors = CustomerFeatures::field_errors(&fractional);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "REGION_RATING_CLIENT");
        assert_eq!(errors[0].message, "expected an integer");
    }

    #[test]
    fn test_field_errors_list_every_problem() {
        let errors = CustomerFeatures::field_errors(&json!({}));
        let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, feature_names().collect::<Vec<_>>());
        assert!(errors.iter().all(|e| e.message == "field required"));

        let mut payload = sample_payload();
        payload["EXT_SOURCE_1"] = json!("high");
        payload.as_object_mut().unwrap().remove("DAYS_BIRTH");
        let errors = CustomerFeatures::field_errors(&payload);
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].field, "EXT_SOURCE_1");
        assert_eq!(errors[0].message, "expected a number");
        assert_eq!(errors[1].field, "DAYS_BIRTH");
        assert_eq!(errors[1].message, "field required");

        assert_eq!(CustomerFeatures::field_errors(&json!([1, 2]))[0].field, "body");
    }

    #[test]
    fn test_null_value_is_missing() {
        let mut payload = sample_payload();
        payload["EXT_SOURCE_1"] = Value::Null;
        let features: CustomerFeatures = serde_json::from_value(payload).unwrap();
        assert!(features.to_vector()[2].is_nan());
        assert_eq!(features.to_feature_map()["EXT_SOURCE_1"], Value::Null);
    }

    #[test]
    fn test_range_rules() {
        let mut payload = sample_payload();
        payload["EXT_SOURCE_2"] = json!(1.5);
        let features: CustomerFeatures = serde_json::from_value(payload).unwrap();
        let errors = features.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("ext_source_2"));
        assert_eq!(canonical_field_name("ext_source_2"), "EXT_SOURCE_2");
    }

    #[test]
    fn test_int_features_serialize_as_integers() {
        assert_eq!(feature_value_json(FeatureKind::Int, -500.0), json!(-500));
        assert_eq!(feature_value_json(FeatureKind::Float, 0.5), json!(0.5));
        assert_eq!(feature_value_json(FeatureKind::Float, f64::NAN), Value::Null);
    }
}
