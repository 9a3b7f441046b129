use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

const SUMMARIZED_STAGE: u8 = 3;

/// Pipeline position of an item.
///
/// Status only moves forward through the pipeline or jumps to `Failed`. The single way back to
/// `New` is an explicit retry of a failed item.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
	New,
	Fetched,
	FactsExtracted,
	Summarized,
	Failed,
}
impl ItemStatus {
	pub const ALL: [Self; 5] =
		[Self::New, Self::Fetched, Self::FactsExtracted, Self::Summarized, Self::Failed];

	pub fn as_str(self) -> &'static str {
		match self {
			Self::New => "new",
			Self::Fetched => "fetched",
			Self::FactsExtracted => "facts_extracted",
			Self::Summarized => "summarized",
			Self::Failed => "failed",
		}
	}

	pub fn is_terminal(self) -> bool {
		matches!(self, Self::Summarized | Self::Failed)
	}

	/// Whether the pipeline may move an item from `self` to `next`.
	///
	/// Re-applying the current stage is allowed so a redelivered step can overwrite its own
	/// artifacts. Only in-flight items can fail; a summarized item keeps its results.
	pub fn can_advance_to(self, next: Self) -> bool {
		match (self.stage(), next.stage()) {
			(Some(from), None) => from < SUMMARIZED_STAGE,
			(Some(from), Some(to)) => to == from || to == from + 1,
			(None, _) => false,
		}
	}

	/// Statuses from which the pipeline may write `self`.
	pub fn predecessors(self) -> Vec<Self> {
		Self::ALL.into_iter().filter(|from| from.can_advance_to(self)).collect()
	}

	pub fn can_retry(self) -> bool {
		self == Self::Failed
	}

	fn stage(self) -> Option<u8> {
		match self {
			Self::New => Some(0),
			Self::Fetched => Some(1),
			Self::FactsExtracted => Some(2),
			Self::Summarized => Some(SUMMARIZED_STAGE),
			Self::Failed => None,
		}
	}
}
impl fmt::Display for ItemStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}
impl FromStr for ItemStatus {
	type Err = String;

	fn from_str(raw: &str) -> Result<Self, Self::Err> {
		Self::ALL
			.into_iter()
			.find(|status| status.as_str() == raw)
			.ok_or_else(|| format!("Unknown item status {raw:?}."))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn forward_steps_are_allowed() {
		assert!(ItemStatus::New.can_advance_to(ItemStatus::Fetched));
		assert!(ItemStatus::Fetched.can_advance_to(ItemStatus::FactsExtracted));
		assert!(ItemStatus::FactsExtracted.can_advance_to(ItemStatus::Summarized));
		assert!(ItemStatus::Fetched.can_advance_to(ItemStatus::Fetched));
	}

	#[test]
	fn regressions_and_skips_are_rejected() {
		assert!(!ItemStatus::Summarized.can_advance_to(ItemStatus::Fetched));
		assert!(!ItemStatus::Summarized.can_advance_to(ItemStatus::New));
		assert!(!ItemStatus::New.can_advance_to(ItemStatus::Summarized));
		assert!(!ItemStatus::Failed.can_advance_to(ItemStatus::Fetched));
	}

	#[test]
	fn only_in_flight_statuses_can_fail() {
		assert_eq!(
			ItemStatus::Failed.predecessors(),
			vec![ItemStatus::New, ItemStatus::Fetched, ItemStatus::FactsExtracted]
		);
		assert!(!ItemStatus::Summarized.can_advance_to(ItemStatus::Failed));
		assert!(!ItemStatus::Failed.can_advance_to(ItemStatus::Failed));
	}

	#[test]
	fn parses_wire_names() {
		assert_eq!("facts_extracted".parse::<ItemStatus>(), Ok(ItemStatus::FactsExtracted));
		assert!("done".parse::<ItemStatus>().is_err());
	}
}
