pub fn render_schema() -> String {
	expand_includes(include_str!("../../../sql/init.sql"))
}

/// Non-empty statements of a rendered schema, in order.
pub fn statements(sql: &str) -> impl Iterator<Item = &str> {
	sql.split(';').map(str::trim).filter(|statement| !statement.is_empty())
}

fn expand_includes(sql: &str) -> String {
	let mut out = String::new();

	for line in sql.lines() {
		let trimmed = line.trim();

		let Some(path) = trimmed.strip_prefix("\\ir ") else {
			out.push_str(line);
			out.push('\n');

			continue;
		};
		let body = match path.trim() {
			"00_extensions.sql" => include_str!("../../../sql/00_extensions.sql"),
			"tables/001_users.sql" => include_str!("../../../sql/tables/001_users.sql"),
			"tables/002_user_settings.sql" =>
				include_str!("../../../sql/tables/002_user_settings.sql"),
			"tables/003_sources.sql" => include_str!("../../../sql/tables/003_sources.sql"),
			"tables/004_items.sql" => include_str!("../../../sql/tables/004_items.sql"),
			"tables/005_item_facts.sql" => include_str!("../../../sql/tables/005_item_facts.sql"),
			"tables/006_item_summaries.sql" =>
				include_str!("../../../sql/tables/006_item_summaries.sql"),
			"tables/007_item_embeddings.sql" =>
				include_str!("../../../sql/tables/007_item_embeddings.sql"),
			"tables/008_item_feedbacks.sql" =>
				include_str!("../../../sql/tables/008_item_feedbacks.sql"),
			"tables/009_item_reads.sql" => include_str!("../../../sql/tables/009_item_reads.sql"),
			"tables/010_reading_streaks.sql" =>
				include_str!("../../../sql/tables/010_reading_streaks.sql"),
			"tables/011_digests.sql" => include_str!("../../../sql/tables/011_digests.sql"),
			"tables/012_digest_items.sql" =>
				include_str!("../../../sql/tables/012_digest_items.sql"),
			"tables/013_digest_cluster_drafts.sql" =>
				include_str!("../../../sql/tables/013_digest_cluster_drafts.sql"),
			"tables/014_llm_usage_logs.sql" =>
				include_str!("../../../sql/tables/014_llm_usage_logs.sql"),
			"tables/015_budget_alert_logs.sql" =>
				include_str!("../../../sql/tables/015_budget_alert_logs.sql"),
			"tables/016_event_outbox.sql" =>
				include_str!("../../../sql/tables/016_event_outbox.sql"),
			_ => {
				out.push_str(line);
				out.push('\n');

				continue;
			},
		};

		out.push_str(body);
		out.push('\n');
	}

	out
}
