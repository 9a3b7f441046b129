use std::collections::HashSet;

use crate::ranking::Ranked;

pub const UNTAGGED_TOPIC: &str = "__untagged__";

/// First non-blank topic, trimmed.
pub fn topic_key(topics: &[String]) -> &str {
	topics.iter().map(|topic| topic.trim()).find(|topic| !topic.is_empty()).unwrap_or(UNTAGGED_TOPIC)
}

/// Picks up to `size` items from a best-first list.
///
/// The first pass takes one item per topic key; the second fills the remaining slots in order.
pub fn diversify(items: &[Ranked], size: usize) -> Vec<Ranked> {
	let mut picked = vec![false; items.len()];
	let mut order = Vec::with_capacity(size.min(items.len()));
	let mut seen_topics = HashSet::new();

	for (idx, item) in items.iter().enumerate() {
		if order.len() >= size {
			break;
		}
		if seen_topics.insert(topic_key(&item.item.topics)) {
			picked[idx] = true;

			order.push(idx);
		}
	}
	for (idx, flag) in picked.iter().enumerate() {
		if order.len() >= size {
			break;
		}
		if !*flag {
			order.push(idx);
		}
	}

	order.into_iter().map(|idx| items[idx].clone()).collect()
}
