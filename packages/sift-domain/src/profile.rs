/// Feedback on one item joined with that item's embedding.
#[derive(Clone, Debug)]
pub struct FeedbackSignal {
	pub rating: i16,
	pub is_favorite: bool,
	pub dimensions: i32,
	pub embedding: Vec<f64>,
}

pub const LIKE_WEIGHT: f64 = 1.0;
pub const FAVORITE_WEIGHT: f64 = 0.7;

pub fn signal_weight(rating: i16, is_favorite: bool) -> f64 {
	let mut weight = match rating.signum() {
		1 => LIKE_WEIGHT,
		-1 => -LIKE_WEIGHT,
		_ => 0.0,
	};

	if is_favorite {
		weight += FAVORITE_WEIGHT;
	}

	weight
}

/// Builds a user's preference vector from feedback, newest first.
///
/// The first usable signal fixes the dimensionality. Returns `None` when nothing qualifies.
pub fn build_profile(signals: &[FeedbackSignal]) -> Option<Vec<f64>> {
	let mut sum: Vec<f64> = Vec::new();
	let mut total_weight = 0.0;

	for signal in signals {
		let weight = signal_weight(signal.rating, signal.is_favorite);

		if weight == 0.0 || signal.dimensions <= 0 {
			continue;
		}
		if signal.embedding.len() != signal.dimensions as usize {
			continue;
		}
		if sum.is_empty() {
			sum = vec![0.0; signal.embedding.len()];
		} else if sum.len() != signal.embedding.len() {
			continue;
		}

		for (acc, value) in sum.iter_mut().zip(&signal.embedding) {
			*acc += weight * value;
		}

		total_weight += weight.abs();
	}

	if sum.is_empty() || total_weight == 0.0 {
		return None;
	}

	for value in &mut sum {
		*value /= total_weight;
	}

	Some(sum)
}

/// Dot product; vectors of different length contribute nothing.
pub fn dot(a: &[f64], b: &[f64]) -> f64 {
	if a.is_empty() || a.len() != b.len() {
		return 0.0;
	}

	a.iter().zip(b).map(|(x, y)| x * y).sum()
}
