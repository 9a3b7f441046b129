use feed_rs::parser;
use time::OffsetDateTime;

use crate::Result;

#[derive(Clone, Debug, PartialEq)]
pub struct FeedEntry {
	pub url: String,
	pub title: Option<String>,
	pub published_at: Option<OffsetDateTime>,
}

pub async fn fetch_feed(url: &str, timeout_ms: u64) -> Result<Vec<FeedEntry>> {
	let client = crate::http_client(timeout_ms)?;
	let res = client.get(url).send().await?;
	let res = crate::check_status("feed", res).await?;
	let bytes = res.bytes().await?;

	parse_feed(&bytes)
}

/// Entries with a link, in feed order; duplicate links keep their first entry.
pub fn parse_feed(bytes: &[u8]) -> Result<Vec<FeedEntry>> {
	let feed = parser::parse(bytes)?;
	let mut entries: Vec<FeedEntry> = Vec::with_capacity(feed.entries.len());

	for entry in feed.entries {
		let Some(url) = entry.links.first().map(|link| link.href.trim().to_string()) else {
			continue;
		};

		if url.is_empty() || entries.iter().any(|seen| seen.url == url) {
			continue;
		}

		let title = entry
			.title
			.map(|text| text.content.trim().to_string())
			.filter(|title| !title.is_empty());
		let published_at = entry
			.published
			.or(entry.updated)
			.and_then(|at| OffsetDateTime::from_unix_timestamp(at.timestamp()).ok());

		entries.push(FeedEntry { url, title, published_at });
	}

	Ok(entries)
}

#[cfg(test)]
mod tests {
	use super::*;

	const RSS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>Example</title>
    <link>https://example.com</link>
    <description>Example feed</description>
    <item>
      <title>First post</title>
      <link>https://example.com/first</link>
      <pubDate>Mon, 01 Jan 2024 00:00:00 GMT</pubDate>
    </item>
    <item>
      <title>Duplicate</title>
      <link>https://example.com/first</link>
    </item>
    <item>
      <title>No link</title>
    </item>
  </channel>
</rss>"#;

	#[test]
	fn keeps_linked_unique_entries() {
		let entries = parse_feed(RSS.as_bytes()).expect("Failed to parse feed.");

		assert_eq!(entries.len(), 1);
		assert_eq!(entries[0].url, "https://example.com/first");
		assert_eq!(entries[0].title.as_deref(), Some("First post"));
		assert_eq!(entries[0].published_at.map(|at| at.unix_timestamp()), Some(1_704_067_200));
	}

	#[test]
	fn rejects_non_feeds() {
		assert!(parse_feed(b"not a feed").is_err());
	}
}
