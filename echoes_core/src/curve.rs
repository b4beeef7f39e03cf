use serde::{Deserialize, Serialize};

/// Piecewise-linear keyframe curve over normalized time.
///
/// Keys are `[t, value]` pairs. Evaluation clamps to the first and last key
/// outside their range; an empty curve evaluates to 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyCurve {
    keys: Vec<[f32; 2]>,
}

impl KeyCurve {
    pub fn new(mut keys: Vec<[f32; 2]>) -> Self {
        keys.retain(|[t, value]| t.is_finite() && value.is_finite());
        keys.sort_by(|a, b| a[0].total_cmp(&b[0]));
        Self { keys }
    }

    pub fn linear(start: f32, end: f32) -> Self {
        Self::new(vec![[0.0, start], [1.0, end]])
    }

    pub fn keys(&self) -> &[[f32; 2]] {
        &self.keys
    }

    pub fn evaluate(&self, t: f32) -> f32 {
        let (first, last) = match (self.keys.first(), self.keys.last()) {
            (Some(first), Some(last)) => (first, last),
            _ => return 0.0,
        };
        if t.is_nan() || t <= first[0] {
            return first[1];
        }
        if t >= last[0] {
            return last[1];
        }
        for pair in self.keys.windows(2) {
            let [t0, v0] = pair[0];
            let [t1, v1] = pair[1];
            if t <= t1 {
                let span = t1 - t0;
                if span <= f32::EPSILON {
                    return v1;
                }
                let local = (t - t0) / span;
                return v0 + (v1 - v0) * local;
            }
        }
        last[1]
    }

    /// Sorts and drops non-finite keys; used after deserializing.
    pub fn normalized(self) -> Self {
        Self::new(self.keys)
    }
}
