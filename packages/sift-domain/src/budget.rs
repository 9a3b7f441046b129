use serde::Serialize;

use crate::text;

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum BudgetDecision {
	/// No budget configured.
	NoBudget,
	/// Remaining share is still at or above the threshold.
	WithinThreshold { remaining_ratio: f64 },
	/// Remaining share fell below the threshold.
	Alert { remaining_ratio: f64 },
}

pub fn evaluate(monthly_budget_usd: f64, used_cost_usd: f64, threshold_pct: i32) -> BudgetDecision {
	if monthly_budget_usd <= 0.0 {
		return BudgetDecision::NoBudget;
	}

	let remaining_ratio = (monthly_budget_usd - used_cost_usd) / monthly_budget_usd;

	if remaining_ratio >= f64::from(threshold_pct) / 100.0 {
		BudgetDecision::WithinThreshold { remaining_ratio }
	} else {
		BudgetDecision::Alert { remaining_ratio }
	}
}

#[derive(Clone, Debug)]
pub struct BudgetAlert {
	pub month: String,
	pub monthly_budget_usd: f64,
	pub used_cost_usd: f64,
	pub remaining_ratio: f64,
	pub threshold_pct: i32,
}
impl BudgetAlert {
	pub fn remaining_usd(&self) -> f64 {
		self.monthly_budget_usd - self.used_cost_usd
	}

	pub fn subject(&self) -> String {
		format!("Sift: monthly LLM budget below {}% remaining", self.threshold_pct)
	}

	pub fn render_html(&self) -> String {
		let row = |label: &str, value: String| {
			format!("<p style=\"margin:0 0 6px;color:#444\">{label}: <strong>{value}</strong></p>")
		};
		let mut html = String::from(
			"<!DOCTYPE html><html><body style=\"font-family:sans-serif;max-width:640px;margin:0 auto;padding:20px\">",
		);

		html.push_str("<h1 style=\"font-size:22px;margin:0 0 12px\">Sift budget alert</h1>");
		html.push_str(&format!(
			"<p style=\"line-height:1.7;color:#333\">Your monthly LLM budget for {} has fallen below <strong>{}%</strong> remaining.</p>",
			text::escape_html(&self.month),
			self.threshold_pct
		));
		html.push_str("<div style=\"border:1px solid #e4e4e7;border-radius:10px;padding:14px 16px;background:#fafafa\">");
		html.push_str(&row("Monthly budget", format!("${:.4}", self.monthly_budget_usd)));
		html.push_str(&row("Estimated spend", format!("${:.4}", self.used_cost_usd)));
		html.push_str(&row("Estimated remaining", format!("${:.4}", self.remaining_usd())));
		html.push_str(&row("Remaining share", format!("{:.1}%", self.remaining_ratio * 100.0)));
		html.push_str("</div></body></html>");

		html
	}
}
