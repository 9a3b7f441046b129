pub const ELLIPSIS: &str = "...";

/// Cuts `raw` to at most `max` characters, appending an ellipsis when anything was dropped.
pub fn truncate_chars(raw: &str, max: usize) -> String {
	match raw.char_indices().nth(max) {
		Some((cut, _)) => format!("{}{ELLIPSIS}", &raw[..cut]),
		None => raw.to_string(),
	}
}

/// Escapes text for inclusion in HTML bodies and attributes.
pub fn escape_html(raw: &str) -> String {
	let mut out = String::with_capacity(raw.len());

	for ch in raw.chars() {
		match ch {
			'&' => out.push_str("&amp;"),
			'<' => out.push_str("&lt;"),
			'>' => out.push_str("&gt;"),
			'"' => out.push_str("&quot;"),
			'\'' => out.push_str("&#39;"),
			_ => out.push(ch),
		}
	}

	out
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn truncation_counts_characters() {
		assert_eq!(truncate_chars("héllo", 5), "héllo");
		assert_eq!(truncate_chars("héllo", 2), "hé...");
		assert_eq!(truncate_chars("", 0), "");
	}

	#[test]
	fn escapes_markup() {
		assert_eq!(escape_html("<a href=\"x\">&'</a>"), "&lt;a href=&quot;x&quot;&gt;&amp;&#39;&lt;/a&gt;");
	}
}
