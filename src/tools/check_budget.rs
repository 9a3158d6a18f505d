use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Months, NaiveDate, Utc};
use serde_json::json;

use super::{Tool, clean, decode, money, round2};
use crate::actions::{ActionResult, ActionType, CheckBudgetParams};
use crate::error::BodegaError;
use crate::store::Store;
use crate::store::models::Receipt;

const ACTION: ActionType = ActionType::CheckBudget;

/// Reports this month's spending against the user's budget. Read-only; store
/// errors are left for the dispatcher to report.
pub struct CheckBudgetTool {
    store: Arc<dyn Store>,
    warning_ratio: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BudgetStatus {
    NoBudget,
    OnTrack,
    Low,
    Over,
}

impl BudgetStatus {
    fn as_str(self) -> &'static str {
        match self {
            BudgetStatus::NoBudget => "no_budget",
            BudgetStatus::OnTrack => "on_track",
            BudgetStatus::Low => "low",
            BudgetStatus::Over => "over",
        }
    }
}

fn assess(spent: f64, limit: Option<f64>, warning_ratio: f64) -> BudgetStatus {
    let Some(limit) = limit else {
        return BudgetStatus::NoBudget;
    };
    let remaining = limit - spent;
    if remaining < 0.0 {
        BudgetStatus::Over
    } else if remaining < limit * warning_ratio {
        BudgetStatus::Low
    } else {
        BudgetStatus::OnTrack
    }
}

/// `[first of month, first of next month)` as UTC instants.
fn month_bounds(today: NaiveDate) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let start = today.with_day(1)?;
    let end = start.checked_add_months(Months::new(1))?;
    Some((
        start.and_hms_opt(0, 0, 0)?.and_utc(),
        end.and_hms_opt(0, 0, 0)?.and_utc(),
    ))
}

fn spent_in(receipts: &[Receipt], category: &str) -> f64 {
    receipts
        .iter()
        .filter(|r| {
            r.category
                .as_deref()
                .is_some_and(|c| c.eq_ignore_ascii_case(category))
        })
        .fold(0.0, |acc, r| acc + r.total)
}

impl CheckBudgetTool {
    pub fn new(store: Arc<dyn Store>, warning_ratio: f64) -> Self {
        Self {
            store,
            warning_ratio,
        }
    }
}

#[async_trait]
impl Tool for CheckBudgetTool {
    fn action(&self) -> ActionType {
        ACTION
    }

    fn description(&self) -> &str {
        "Show how much of this month's budget is left. Parameters: optional category."
    }

    async fn execute(
        &self,
        params: &serde_json::Value,
        user_id: &str,
    ) -> Result<ActionResult, BodegaError> {
        let params: CheckBudgetParams = match decode(ACTION, params) {
            Ok(p) => p,
            Err(rejected) => return Ok(rejected),
        };
        let category = clean(params.category);

        let now = Utc::now();
        let (from, to) = month_bounds(now.date_naive())
            .ok_or_else(|| BodegaError::InvalidParams(format!("no month bounds for {now}")))?;

        let receipts = self.store.receipts_between(user_id, from, to).await?;
        let budgets = self.store.category_budgets(user_id).await?;
        let monthly = self.store.monthly_budget(user_id).await?;

        let total_spent = receipts.iter().fold(0.0, |acc, r| acc + r.total);
        let (spent, limit) = match &category {
            Some(cat) => (
                spent_in(&receipts, cat),
                budgets
                    .iter()
                    .find(|b| b.category.eq_ignore_ascii_case(cat))
                    .map(|b| b.monthly_limit),
            ),
            None => (
                total_spent,
                monthly.or_else(|| {
                    (!budgets.is_empty())
                        .then(|| budgets.iter().fold(0.0, |acc, b| acc + b.monthly_limit))
                }),
            ),
        };

        let status = assess(spent, limit, self.warning_ratio);
        let remaining = limit.map(|l| l - spent);
        let percent_used = limit.filter(|l| *l > 0.0).map(|l| spent / l * 100.0);

        let scope = match &category {
            Some(cat) => format!("your {cat} budget"),
            None => "your monthly budget".to_owned(),
        };
        let message = match (status, limit, remaining) {
            (BudgetStatus::Over, Some(l), Some(r)) => format!(
                "You're {} over {scope} of {}. You've spent {} this month.",
                money(-r),
                money(l),
                money(spent)
            ),
            (BudgetStatus::Low, Some(l), Some(r)) => format!(
                "Heads up: only {} left in {scope} of {} ({:.0}% used).",
                money(r),
                money(l),
                percent_used.unwrap_or(100.0)
            ),
            (BudgetStatus::OnTrack, Some(l), Some(r)) => format!(
                "You have {} left in {scope} of {} ({} spent so far this month).",
                money(r),
                money(l),
                money(spent)
            ),
            _ => match &category {
                Some(cat) => format!(
                    "You've spent {} on {cat} this month, but you haven't set a budget for it yet.",
                    money(spent)
                ),
                None => format!(
                    "You've spent {} so far this month. You haven't set a monthly budget yet.",
                    money(spent)
                ),
            },
        };

        let breakdown: Vec<_> = budgets
            .iter()
            .map(|b| {
                let spent = spent_in(&receipts, &b.category);
                json!({
                    "category": b.category,
                    "limit": b.monthly_limit,
                    "spent": round2(spent),
                    "remaining": round2(b.monthly_limit - spent),
                })
            })
            .collect();

        Ok(ActionResult::ok(
            ACTION,
            message,
            json!({
                "month": now.format("%Y-%m").to_string(),
                "category": category,
                "spent": round2(spent),
                "limit": limit,
                "remaining": remaining.map(round2),
                "percentUsed": percent_used.map(round2),
                "status": status.as_str(),
                "lowBudget": matches!(status, BudgetStatus::Low | BudgetStatus::Over),
                "receiptCount": receipts.len(),
                "categories": breakdown,
            }),
        ))
    }
}
