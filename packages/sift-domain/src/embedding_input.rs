pub const MAX_FACTS: usize = 12;

/// Text sent to the embedding service for one summarized item.
pub fn build_embedding_input(
	title: Option<&str>,
	summary: &str,
	topics: &[String],
	facts: &[String],
) -> String {
	let mut out = String::new();

	if let Some(title) = title.filter(|title| !title.is_empty()) {
		out.push_str(&format!("title: {title}\n"));
	}
	if !summary.is_empty() {
		out.push_str(&format!("summary: {summary}\n"));
	}
	if !topics.is_empty() {
		out.push_str(&format!("topics: {}\n", topics.join(", ")));
	}

	let facts: Vec<&str> = facts
		.iter()
		.map(String::as_str)
		.filter(|fact| !fact.trim().is_empty())
		.take(MAX_FACTS)
		.collect();

	if !facts.is_empty() {
		out.push_str("facts:\n");

		for fact in facts {
			out.push_str(&format!("- {fact}\n"));
		}
	}

	out
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn includes_present_sections_only() {
		let input = build_embedding_input(None, "short", &["ai".to_string(), "rust".to_string()], &[]);

		assert_eq!(input, "summary: short\ntopics: ai, rust\n");
	}

	#[test]
	fn caps_fact_list() {
		let facts: Vec<String> = (0..20).map(|idx| format!("fact {idx}")).collect();
		let input = build_embedding_input(Some("T"), "", &[], &facts);

		assert!(input.starts_with("title: T\nfacts:\n- fact 0\n"));
		assert_eq!(input.lines().filter(|line| line.starts_with("- ")).count(), MAX_FACTS);
	}
}
