use std::fmt;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::BodegaError;

/// The closed set of operations an assistant reply can trigger.
/// Variant order is registration order in the tool registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionType {
    AddToList,
    SetAlert,
    CheckBudget,
    SearchPrices,
    FindStores,
}

impl ActionType {
    pub const ALL: [ActionType; 5] = [
        ActionType::AddToList,
        ActionType::SetAlert,
        ActionType::CheckBudget,
        ActionType::SearchPrices,
        ActionType::FindStores,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ActionType::AddToList => "ADD_TO_LIST",
            ActionType::SetAlert => "SET_ALERT",
            ActionType::CheckBudget => "CHECK_BUDGET",
            ActionType::SearchPrices => "SEARCH_PRICES",
            ActionType::FindStores => "FIND_STORES",
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionType {
    type Err = BodegaError;

    /// Exact, case-sensitive match on the directive name.
    fn from_str(s: &str) -> Result<Self, BodegaError> {
        ActionType::ALL
            .into_iter()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| BodegaError::InvalidParams(format!("unknown action '{s}'")))
    }
}

/// Outcome of one dispatched action. `message` is always fit for direct display.
///
/// `action` echoes the identifier the caller passed in, so it is a plain string
/// rather than `ActionType`: unknown identifiers are reported back verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionResult {
    pub success: bool,
    pub action: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl ActionResult {
    pub fn ok(action: ActionType, message: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            success: true,
            action: action.as_str().to_owned(),
            message: message.into(),
            data: Some(data),
        }
    }

    pub fn failure(action: &str, message: impl Into<String>) -> Self {
        Self {
            success: false,
            action: action.to_owned(),
            message: message.into(),
            data: None,
        }
    }

    /// The typed action, if the echoed identifier is a known one.
    pub fn action_type(&self) -> Option<ActionType> {
        self.action.parse().ok()
    }
}

// --- Typed parameter records, one per action kind (camelCase on the wire) ---

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AddToListParams {
    pub item: String,
    #[serde(
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_whole_number"
    )]
    pub quantity: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub list_id: Option<uuid::Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub list_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SetAlertParams {
    pub product: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_price: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CheckBudgetParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SearchPricesParams {
    pub query: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_results: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FindStoresParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retailer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_results: Option<usize>,
}

/// Parameters for any action kind, as produced by the response parser.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ActionParams {
    AddToList(AddToListParams),
    SetAlert(SetAlertParams),
    CheckBudget(CheckBudgetParams),
    SearchPrices(SearchPricesParams),
    FindStores(FindStoresParams),
}

impl ActionParams {
    pub fn action(&self) -> ActionType {
        match self {
            ActionParams::AddToList(_) => ActionType::AddToList,
            ActionParams::SetAlert(_) => ActionType::SetAlert,
            ActionParams::CheckBudget(_) => ActionType::CheckBudget,
            ActionParams::SearchPrices(_) => ActionType::SearchPrices,
            ActionParams::FindStores(_) => ActionType::FindStores,
        }
    }

    /// The open JSON mapping handed to `ToolRegistry::execute_action`.
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

/// Decode an open params mapping into a tool's typed record.
///
/// `null` is treated as an empty object; anything that is not an object, or has
/// a field of the wrong type, is rejected.
pub fn decode_params<T: DeserializeOwned + Default>(
    params: &serde_json::Value,
) -> Result<T, BodegaError> {
    match params {
        serde_json::Value::Null => Ok(T::default()),
        serde_json::Value::Object(fields) => serde_json::from_value(params.clone()).map_err(|e| {
            let field = fields.iter().find_map(|(name, value)| {
                let mut single = serde_json::Map::new();
                single.insert(name.clone(), value.clone());
                serde_json::from_value::<T>(serde_json::Value::Object(single))
                    .is_err()
                    .then_some(name.as_str())
            });
            warn!(error = %e, field = field.unwrap_or("-"), "params rejected");
            BodegaError::InvalidParams(match field {
                Some(name) => format!("`{name}` has a value I can't use"),
                None => "some values have the wrong form".to_owned(),
            })
        }),
        _ => Err(BodegaError::InvalidParams(
            "parameters must be a set of named values".to_owned(),
        )),
    }
}

/// Accepts integers and integral floats (`2.0`), so model output like
/// `{"quantity": 2.0}` still reads as a count.
fn deserialize_whole_number<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de;

    struct WholeNumberVisitor;

    impl<'de> de::Visitor<'de> for WholeNumberVisitor {
        type Value = Option<i64>;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a whole number")
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
            Ok(Some(v))
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
            i64::try_from(v)
                .map(Some)
                .map_err(|_| E::invalid_value(de::Unexpected::Unsigned(v), &self))
        }

        fn visit_f64<E: de::Error>(self, v: f64) -> Result<Self::Value, E> {
            if v.fract() == 0.0 && v >= i64::MIN as f64 && v < i64::MAX as f64 {
                Ok(Some(v as i64))
            } else {
                Err(E::invalid_value(de::Unexpected::Float(v), &self))
            }
        }

        fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(None)
        }
    }

    deserializer.deserialize_any(WholeNumberVisitor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn action_type_round_trips_names() {
        for action in ActionType::ALL {
            assert_eq!(action.as_str().parse::<ActionType>().unwrap(), action);
        }
    }

    #[test]
    fn action_type_is_case_sensitive() {
        assert!("add_to_list".parse::<ActionType>().is_err());
        assert!("ADD_TO_LIST ".parse::<ActionType>().is_err());
        assert!("NOT_A_REAL_ACTION".parse::<ActionType>().is_err());
    }

    #[test]
    fn action_type_serializes_screaming_snake() {
        assert_eq!(
            serde_json::to_value(ActionType::SearchPrices).unwrap(),
            json!("SEARCH_PRICES")
        );
    }

    #[test]
    fn result_omits_missing_data() {
        let result = ActionResult::failure("SET_ALERT", "nope");
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(
            value,
            json!({"success": false, "action": "SET_ALERT", "message": "nope"})
        );
        assert_eq!(result.action_type(), Some(ActionType::SetAlert));
    }

    #[test]
    fn decode_accepts_null_and_camel_case() {
        let params: AddToListParams = decode_params(&serde_json::Value::Null).unwrap();
        assert_eq!(params, AddToListParams::default());

        let params: AddToListParams =
            decode_params(&json!({"item": "Milk", "quantity": 2, "listName": "Weekly"})).unwrap();
        assert_eq!(params.item, "Milk");
        assert_eq!(params.quantity, Some(2));
        assert_eq!(params.list_name.as_deref(), Some("Weekly"));
    }

    #[test]
    fn decode_rejects_wrong_types() {
        let err = decode_params::<AddToListParams>(&json!({"quantity": "two"})).unwrap_err();
        assert!(matches!(err, BodegaError::InvalidParams(_)));

        let err = decode_params::<SetAlertParams>(&json!(["Eggs", 3.99])).unwrap_err();
        assert!(matches!(err, BodegaError::InvalidParams(_)));
    }

    #[test]
    fn rejection_names_the_field_without_decoder_details() {
        let err = decode_params::<AddToListParams>(&json!({"item": "Milk", "listId": "abc"}))
            .unwrap_err();
        assert_eq!(err.to_string(), "invalid parameters: `listId` has a value I can't use");

        let err = decode_params::<AddToListParams>(&json!({"quantity": 2.5})).unwrap_err();
        let text = err.to_string();
        assert!(text.contains("`quantity`"), "{text}");
        assert!(!text.contains("f64") && !text.contains("floating point"), "{text}");
    }

    #[test]
    fn integral_float_quantity_is_accepted() {
        let params: AddToListParams =
            decode_params(&json!({"item": "Milk", "quantity": 2.0})).unwrap();
        assert_eq!(params.quantity, Some(2));

        let params: AddToListParams =
            decode_params(&json!({"item": "Milk", "quantity": null})).unwrap();
        assert_eq!(params.quantity, None);
    }

    #[test]
    fn params_serialize_without_variant_tag() {
        let params = ActionParams::SetAlert(SetAlertParams {
            product: "Eggs".into(),
            target_price: Some(3.99),
        });
        assert_eq!(params.action(), ActionType::SetAlert);
        assert_eq!(
            params.to_value(),
            json!({"product": "Eggs", "targetPrice": 3.99})
        );
    }
}
