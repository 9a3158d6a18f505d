//! Extraction of `[ACTION:<TYPE>] <params>` directives from assistant replies.
//!
//! Parsing is best effort: a directive whose parameters are malformed still
//! yields an entry, with defaults filled in (quantity 1, price 0).

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::actions::{
    ActionParams, ActionType, AddToListParams, CheckBudgetParams, FindStoresParams,
    SearchPricesParams, SetAlertParams,
};

static DIRECTIVE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[ACTION:(ADD_TO_LIST|SET_ALERT|CHECK_BUDGET|SEARCH_PRICES|FIND_STORES)\][ \t]*([^\n]*)")
        .unwrap()
});

/// One directive found in an assistant reply.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedAction {
    pub action: ActionType,
    pub raw_params: String,
    pub params: ActionParams,
}

/// Find every directive in `text`, in source order.
pub fn parse_actions_from_response(text: &str) -> Vec<ParsedAction> {
    DIRECTIVE_RE
        .captures_iter(text)
        .filter_map(|caps| {
            let action: ActionType = caps.get(1)?.as_str().parse().ok()?;
            let raw = caps.get(2).map_or("", |m| m.as_str()).trim();
            Some(ParsedAction {
                action,
                raw_params: raw.to_owned(),
                params: parse_params(action, raw),
            })
        })
        .collect()
}

/// Remove directives from a reply, leaving the prose meant for the user.
/// Lines that held nothing but a directive are dropped entirely.
pub fn strip_directives(text: &str) -> String {
    text.lines()
        .filter_map(|line| {
            if !DIRECTIVE_RE.is_match(line) {
                return Some(line.to_owned());
            }
            let rest = DIRECTIVE_RE.replace_all(line, "");
            let rest = rest.trim_end();
            (!rest.trim().is_empty()).then(|| rest.to_owned())
        })
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_owned()
}

fn parse_params(action: ActionType, raw: &str) -> ActionParams {
    match action {
        ActionType::AddToList => {
            let (item, quantity) = split_first_comma(raw);
            ActionParams::AddToList(AddToListParams {
                item: item.to_owned(),
                quantity: Some(quantity.and_then(leading_integer).unwrap_or(1)),
                ..Default::default()
            })
        }
        ActionType::SetAlert => {
            let (product, price) = split_first_comma(raw);
            ActionParams::SetAlert(SetAlertParams {
                product: product.to_owned(),
                target_price: Some(price.map_or(0.0, extract_price)),
            })
        }
        ActionType::CheckBudget => ActionParams::CheckBudget(CheckBudgetParams {
            category: non_empty(raw),
        }),
        ActionType::SearchPrices => ActionParams::SearchPrices(SearchPricesParams {
            query: raw.to_owned(),
            ..Default::default()
        }),
        ActionType::FindStores => ActionParams::FindStores(FindStoresParams {
            retailer: non_empty(raw),
            ..Default::default()
        }),
    }
}

fn split_first_comma(raw: &str) -> (&str, Option<&str>) {
    match raw.split_once(',') {
        Some((head, tail)) => (head.trim(), Some(tail.trim())),
        None => (raw.trim(), None),
    }
}

fn non_empty(raw: &str) -> Option<String> {
    let raw = raw.trim();
    (!raw.is_empty()).then(|| raw.to_owned())
}

/// Leading run of digits as a quantity. Zero counts as missing.
fn leading_integer(s: &str) -> Option<i64> {
    let digits: String = s.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse::<i64>().ok().filter(|n| *n > 0)
}

/// Keep digits and decimal points, then read the longest number prefix.
/// `"$3.99"` → 3.99, `"about 4 bucks"` → 4.0, `"cheap"` → 0.0.
fn extract_price(s: &str) -> f64 {
    let kept: String = s
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();

    let mut end = 0;
    let mut seen_dot = false;
    for (i, c) in kept.char_indices() {
        if c == '.' {
            if seen_dot {
                break;
            }
            seen_dot = true;
        }
        end = i + c.len_utf8();
    }

    kept[..end].trim_end_matches('.').parse().unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn add_to_list_with_quantity() {
        let parsed = parse_actions_from_response("[ACTION:ADD_TO_LIST] Milk, 2\n");
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].action, ActionType::AddToList);
        assert_eq!(parsed[0].raw_params, "Milk, 2");
        assert_eq!(parsed[0].params.to_value(), json!({"item": "Milk", "quantity": 2}));
    }

    #[test]
    fn add_to_list_defaults_quantity() {
        let parsed = parse_actions_from_response("[ACTION:ADD_TO_LIST] Milk\n");
        assert_eq!(parsed[0].params.to_value(), json!({"item": "Milk", "quantity": 1}));

        let parsed = parse_actions_from_response("[ACTION:ADD_TO_LIST] Bread, a loaf");
        assert_eq!(parsed[0].params.to_value(), json!({"item": "Bread", "quantity": 1}));

        let parsed = parse_actions_from_response("[ACTION:ADD_TO_LIST] Bread, 0");
        assert_eq!(parsed[0].params.to_value(), json!({"item": "Bread", "quantity": 1}));
    }

    #[test]
    fn add_to_list_reads_leading_integer() {
        let parsed = parse_actions_from_response("[ACTION:ADD_TO_LIST] Apples, 6 large ones");
        assert_eq!(parsed[0].params.to_value(), json!({"item": "Apples", "quantity": 6}));
    }

    #[test]
    fn add_to_list_splits_on_first_comma_only() {
        let parsed = parse_actions_from_response("[ACTION:ADD_TO_LIST] Salt, 1, iodized");
        assert_eq!(parsed[0].params.to_value(), json!({"item": "Salt", "quantity": 1}));
    }

    #[test]
    fn set_alert_strips_currency_symbol() {
        let parsed = parse_actions_from_response("[ACTION:SET_ALERT] Eggs, $3.99\n");
        assert_eq!(
            parsed[0].params.to_value(),
            json!({"product": "Eggs", "targetPrice": 3.99})
        );
    }

    #[test]
    fn set_alert_defaults_price_to_zero() {
        let parsed = parse_actions_from_response("[ACTION:SET_ALERT] Eggs");
        assert_eq!(
            parsed[0].params.to_value(),
            json!({"product": "Eggs", "targetPrice": 0.0})
        );

        let parsed = parse_actions_from_response("[ACTION:SET_ALERT] Eggs, whenever cheap");
        assert_eq!(
            parsed[0].params.to_value(),
            json!({"product": "Eggs", "targetPrice": 0.0})
        );
    }

    #[test]
    fn extract_price_variants() {
        assert_eq!(extract_price("$3.99"), 3.99);
        assert_eq!(extract_price("3.99.5"), 3.99);
        assert_eq!(extract_price("about 4 bucks"), 4.0);
        assert_eq!(extract_price("5."), 5.0);
        assert_eq!(extract_price(""), 0.0);
        assert_eq!(extract_price("."), 0.0);
    }

    #[test]
    fn single_field_actions() {
        let parsed = parse_actions_from_response(
            "[ACTION:CHECK_BUDGET] produce\n[ACTION:SEARCH_PRICES] oat milk\n[ACTION:FIND_STORES] Aldi",
        );
        assert_eq!(parsed.len(), 3);
        assert_eq!(parsed[0].params.to_value(), json!({"category": "produce"}));
        assert_eq!(parsed[1].params.to_value(), json!({"query": "oat milk"}));
        assert_eq!(parsed[2].params.to_value(), json!({"retailer": "Aldi"}));
    }

    #[test]
    fn empty_check_budget_has_no_category() {
        let parsed = parse_actions_from_response("[ACTION:CHECK_BUDGET]\n");
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].params.to_value(), json!({}));
    }

    #[test]
    fn multiple_directives_keep_source_order() {
        let text = "Sure! I'll handle that.\n\
                    [ACTION:SET_ALERT] Coffee, 7.50\n\
                    Also adding it to your list.\n\
                    [ACTION:ADD_TO_LIST] Coffee, 1\n";
        let parsed = parse_actions_from_response(text);
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].action, ActionType::SetAlert);
        assert_eq!(parsed[1].action, ActionType::AddToList);
    }

    #[test]
    fn unknown_or_lowercase_types_ignored() {
        let parsed = parse_actions_from_response(
            "[ACTION:DELETE_LIST] all\n[ACTION:add_to_list] Milk\n[action:ADD_TO_LIST] Milk",
        );
        assert!(parsed.is_empty());
    }

    #[test]
    fn text_without_directives() {
        assert!(parse_actions_from_response("Milk is cheapest at Aldi this week.").is_empty());
        assert!(parse_actions_from_response("").is_empty());
    }

    #[test]
    fn crlf_line_endings_trimmed() {
        let parsed = parse_actions_from_response("[ACTION:SEARCH_PRICES] butter\r\nthanks");
        assert_eq!(parsed[0].raw_params, "butter");
    }

    #[test]
    fn strip_directives_keeps_prose() {
        let text = "Added it for you.\n[ACTION:ADD_TO_LIST] Milk, 2\nAnything else?";
        assert_eq!(strip_directives(text), "Added it for you.\nAnything else?");
    }

    #[test]
    fn strip_directives_keeps_leading_text_on_same_line() {
        let text = "On it: [ACTION:SEARCH_PRICES] rice";
        assert_eq!(strip_directives(text), "On it:");
    }
}
