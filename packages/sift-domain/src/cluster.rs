use std::{
	cmp::Ordering,
	collections::{HashMap, HashSet},
};

use serde::Serialize;
use uuid::Uuid;

use sift_config::Ranking;

use crate::ranking::Ranked;

pub const FALLBACK_LABEL: &str = "Related";

#[derive(Clone, Copy, Debug)]
pub struct ClusterThresholds {
	/// Similarity at or above which two items always match.
	pub similarity: f64,
	/// Lower bound of the band where a shared topic is also required.
	pub topic_similarity: f64,
}
impl From<&Ranking> for ClusterThresholds {
	fn from(cfg: &Ranking) -> Self {
		Self {
			similarity: cfg.cluster_similarity_threshold,
			topic_similarity: cfg.cluster_topic_similarity_threshold,
		}
	}
}
impl Default for ClusterThresholds {
	fn default() -> Self {
		Self::from(&Ranking::default())
	}
}

#[derive(Clone, Debug, Serialize)]
pub struct Cluster {
	pub id: Uuid,
	pub label: String,
	pub size: usize,
	pub max_similarity: f64,
	pub representative: Ranked,
	pub items: Vec<Ranked>,
}

/// Cosine similarity; zero-norm or mismatched vectors score 0.
pub fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
	if a.is_empty() || a.len() != b.len() {
		return 0.0;
	}

	let mut dot = 0.0;
	let mut norm_a = 0.0;
	let mut norm_b = 0.0;

	for (x, y) in a.iter().zip(b) {
		dot += x * y;
		norm_a += x * x;
		norm_b += y * y;
	}

	if norm_a == 0.0 || norm_b == 0.0 {
		return 0.0;
	}

	dot / (norm_a.sqrt() * norm_b.sqrt())
}

pub fn has_topic_overlap(a: &[String], b: &[String]) -> bool {
	let left: HashSet<&str> = a.iter().map(String::as_str).filter(|topic| !topic.is_empty()).collect();

	b.iter().any(|topic| !topic.is_empty() && left.contains(topic.as_str()))
}

pub fn should_cluster(similarity: f64, a: &[String], b: &[String], thresholds: ClusterThresholds) -> bool {
	if similarity >= thresholds.similarity {
		return true;
	}
	if similarity < thresholds.topic_similarity {
		return false;
	}

	has_topic_overlap(a, b)
}

pub fn cluster_label(item: &Ranked) -> String {
	if let Some(topic) = item.item.topics.iter().find(|topic| !topic.is_empty()) {
		return topic.clone();
	}

	match item.item.title.as_deref() {
		Some(title) if !title.is_empty() => title.to_string(),
		_ => FALLBACK_LABEL.to_string(),
	}
}

/// Groups candidates whose embeddings form a connected similarity graph.
///
/// The partition does not depend on input order. Singletons are dropped. With a non-empty
/// `selected` set, clusters without a selected member are dropped and the best selected member
/// becomes the representative.
pub fn build_clusters(
	items: &[Ranked],
	selected: Option<&HashSet<Uuid>>,
	thresholds: ClusterThresholds,
) -> Vec<Cluster> {
	let embedded: Vec<usize> = items
		.iter()
		.enumerate()
		.filter(|(_, item)| item.item.embedding.as_ref().is_some_and(|emb| !emb.is_empty()))
		.map(|(idx, _)| idx)
		.collect();

	if embedded.len() < 2 {
		return Vec::new();
	}

	let mut sets = DisjointSet::new(embedded.len());
	let mut edge_max = vec![0.0_f64; embedded.len()];

	for (a, &left) in embedded.iter().enumerate() {
		for (offset, &right) in embedded[a + 1..].iter().enumerate() {
			let b = a + 1 + offset;
			let (Some(left_emb), Some(right_emb)) =
				(items[left].item.embedding.as_deref(), items[right].item.embedding.as_deref())
			else {
				continue;
			};
			let similarity = cosine_similarity(left_emb, right_emb);

			if should_cluster(similarity, &items[left].item.topics, &items[right].item.topics, thresholds) {
				sets.union(a, b);

				edge_max[a] = edge_max[a].max(similarity);
				edge_max[b] = edge_max[b].max(similarity);
			}
		}
	}

	let mut groups: HashMap<usize, Vec<usize>> = HashMap::new();

	for slot in 0..embedded.len() {
		groups.entry(sets.find(slot)).or_default().push(slot);
	}

	let selected = selected.filter(|set| !set.is_empty());
	let mut clusters = Vec::new();

	for slots in groups.into_values() {
		if slots.len() < 2 {
			continue;
		}

		let max_similarity = slots.iter().map(|&slot| edge_max[slot]).fold(0.0, f64::max);
		let mut members: Vec<Ranked> = slots.iter().map(|&slot| items[embedded[slot]].clone()).collect();

		members.sort_by(compare_members);

		let representative = match selected {
			Some(set) => match members.iter().find(|member| set.contains(&member.item.id)) {
				Some(member) => member.clone(),
				None => continue,
			},
			None => members[0].clone(),
		};

		clusters.push(Cluster {
			id: representative.item.id,
			label: cluster_label(&representative),
			size: members.len(),
			max_similarity,
			representative,
			items: members,
		});
	}

	clusters.sort_by(|a, b| {
		b.size
			.cmp(&a.size)
			.then_with(|| b.max_similarity.total_cmp(&a.max_similarity))
			.then_with(|| b.representative.item.created_at.cmp(&a.representative.item.created_at))
			.then_with(|| a.id.cmp(&b.id))
	});

	clusters
}

fn compare_members(a: &Ranked, b: &Ranked) -> Ordering {
	b.member_score()
		.total_cmp(&a.member_score())
		.then_with(|| b.item.created_at.cmp(&a.item.created_at))
		.then_with(|| a.item.id.cmp(&b.item.id))
}

struct DisjointSet {
	parent: Vec<usize>,
	rank: Vec<u8>,
}
impl DisjointSet {
	fn new(len: usize) -> Self {
		Self { parent: (0..len).collect(), rank: vec![0; len] }
	}

	fn find(&mut self, node: usize) -> usize {
		let mut root = node;

		while self.parent[root] != root {
			root = self.parent[root];
		}

		let mut cursor = node;

		while self.parent[cursor] != root {
			let next = self.parent[cursor];

			self.parent[cursor] = root;
			cursor = next;
		}

		root
	}

	fn union(&mut self, a: usize, b: usize) {
		let (root_a, root_b) = (self.find(a), self.find(b));

		if root_a == root_b {
			return;
		}

		match self.rank[root_a].cmp(&self.rank[root_b]) {
			Ordering::Less => self.parent[root_a] = root_b,
			Ordering::Greater => self.parent[root_b] = root_a,
			Ordering::Equal => {
				self.parent[root_b] = root_a;
				self.rank[root_a] += 1;
			},
		}
	}
}
