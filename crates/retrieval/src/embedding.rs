use crate::tokenize::tokenize;

pub trait EmbeddingModel: Send + Sync {
    fn model_name(&self) -> &'static str;
    fn embed(&self, text: &str) -> Vec<f32>;
}

/// Signed feature hashing over normalized tokens. Stands in for a sentence
/// embedding model; similar wording lands on similar buckets.
#[derive(Debug, Clone)]
pub struct HashedTokenEmbedder {
    dims: usize,
}

impl HashedTokenEmbedder {
    pub fn new(dims: usize) -> Self {
        Self { dims: dims.max(32) }
    }
}

impl Default for HashedTokenEmbedder {
    fn default() -> Self {
        Self::new(192)
    }
}

impl EmbeddingModel for HashedTokenEmbedder {
    fn model_name(&self) -> &'static str {
        "hashed-token"
    }

    fn embed(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0_f32; self.dims];

        for token in tokenize(text) {
            let hash = fnv1a(token.as_bytes());
            let index = (hash % self.dims as u64) as usize;
            let sign = if (hash >> 63) == 0 { 1.0 } else { -1.0 };
            vector[index] += sign;
        }

        normalize(&mut vector);
        vector
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in bytes {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

fn normalize(values: &mut [f32]) {
    let norm = values.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for value in values.iter_mut() {
            *value /= norm;
        }
    }
}

pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || b.is_empty() || a.len() != b.len() {
        return 0.0;
    }

    let mut dot = 0.0;
    let mut a_norm = 0.0;
    let mut b_norm = 0.0;

    for (lhs, rhs) in a.iter().zip(b.iter()) {
        dot += lhs * rhs;
        a_norm += lhs * lhs;
        b_norm += rhs * rhs;
    }

    if a_norm == 0.0 || b_norm == 0.0 {
        0.0
    } else {
        dot / (a_norm.sqrt() * b_norm.sqrt())
    }
}
