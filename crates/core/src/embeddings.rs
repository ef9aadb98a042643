use sha2::{Digest, Sha256};

pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = 384;

pub const DEFAULT_NGRAM_DIMENSIONS: usize = 128;

/// Local, deterministic text embedder.
pub trait Embedder {
    fn dimensions(&self) -> usize;

    fn embed(&self, text: &str) -> Vec<f32>;

    fn embed_batch(&self, texts: &[String]) -> Vec<Vec<f32>> {
        texts.iter().map(|text| self.embed(text)).collect()
    }
}

/// Digest-derived vectors: stable across runs, but with no semantic neighbourhood.
/// Only an exact text match scores 1.0.
#[derive(Debug, Clone, Copy)]
pub struct HashEmbedder {
    pub dimensions: usize,
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self {
            dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
        }
    }
}

impl Embedder for HashEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed(&self, text: &str) -> Vec<f32> {
        let digest = Sha256::digest(text.as_bytes());
        let mut vector: Vec<f32> = digest
            .iter()
            .cycle()
            .take(self.dimensions.max(1))
            .map(|byte| f32::from(*byte) / 255.0)
            .collect();

        unit_length(&mut vector);
        vector
    }
}

/// Hashed character-trigram counts. Texts sharing substrings land near each other.
#[derive(Debug, Clone, Copy)]
pub struct CharacterNgramEmbedder {
    pub dimensions: usize,
}

impl Default for CharacterNgramEmbedder {
    fn default() -> Self {
        Self {
            dimensions: DEFAULT_NGRAM_DIMENSIONS,
        }
    }
}

impl Embedder for CharacterNgramEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dimensions.max(1)];
        let lowered = text.to_lowercase();
        let chars: Vec<char> = lowered.chars().collect();

        if chars.is_empty() {
            return vector;
        }

        for window in chars.windows(3) {
            let token = window.iter().collect::<String>();
            let mut hash = 1469598103934665603u64;
            for byte in token.bytes() {
                hash ^= byte as u64;
                hash = hash.wrapping_mul(1099511628211);
            }
            let bucket = (hash % vector.len() as u64) as usize;
            vector[bucket] += 1.0;
        }

        unit_length(&mut vector);
        vector
    }
}

/// Which local embedder backs the offline fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LocalEmbedderKind {
    #[default]
    Hash,
    Ngram,
}

impl std::str::FromStr for LocalEmbedderKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "hash" | "sha256" => Ok(Self::Hash),
            "ngram" | "trigram" => Ok(Self::Ngram),
            other => Err(format!("unknown local embedder '{other}' (expected hash or ngram)")),
        }
    }
}

/// Either local embedder behind one concrete type.
#[derive(Debug, Clone, Copy)]
pub enum LocalEmbedder {
    Hash(HashEmbedder),
    Ngram(CharacterNgramEmbedder),
}

impl From<LocalEmbedderKind> for LocalEmbedder {
    fn from(kind: LocalEmbedderKind) -> Self {
        match kind {
            LocalEmbedderKind::Hash => Self::Hash(HashEmbedder::default()),
            LocalEmbedderKind::Ngram => Self::Ngram(CharacterNgramEmbedder::default()),
        }
    }
}

impl Default for LocalEmbedder {
    fn default() -> Self {
        LocalEmbedderKind::default().into()
    }
}

impl Embedder for LocalEmbedder {
    fn dimensions(&self) -> usize {
        match self {
            Self::Hash(embedder) => embedder.dimensions(),
            Self::Ngram(embedder) => embedder.dimensions(),
        }
    }

    fn embed(&self, text: &str) -> Vec<f32> {
        match self {
            Self::Hash(embedder) => embedder.embed(text),
            Self::Ngram(embedder) => embedder.embed(text),
        }
    }
}

fn unit_length(vector: &mut [f32]) {
    let magnitude = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
    if magnitude > 0.0 {
        for value in vector.iter_mut() {
            *value /= magnitude;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedder_is_deterministic() {
        let embedder = CharacterNgramEmbedder::default();
        let first = embedder.embed("Hydraulic pressure and flow");
        let second = embedder.embed("Hydraulic pressure and flow");
        assert_eq!(first, second);
    }

    #[test]
    fn embedder_outputs_expected_length() {
        let embedder = CharacterNgramEmbedder { dimensions: 32 };
        let vector = embedder.embed("abc");
        assert_eq!(vector.len(), 32);
    }

    #[test]
    fn hash_embedding_is_unit_length_and_stable() {
        let embedder = HashEmbedder::default();
        let vector = embedder.embed("The sky is blue.");
        assert_eq!(vector.len(), DEFAULT_EMBEDDING_DIMENSIONS);
        let norm = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
        assert_eq!(vector, embedder.embed("The sky is blue."));
        assert_ne!(vector, embedder.embed("Water is wet."));
    }

    #[test]
    fn hash_embedding_repeats_the_digest() {
        let vector = HashEmbedder { dimensions: 64 }.embed("x");
        assert_eq!(vector[..32], vector[32..]);
    }

    #[test]
    fn batch_matches_single_calls() {
        let embedder = LocalEmbedder::from(LocalEmbedderKind::Ngram);
        let texts = vec!["first".to_string(), "second".to_string()];
        let batch = embedder.embed_batch(&texts);
        assert_eq!(batch, vec![embedder.embed("first"), embedder.embed("second")]);
    }

    #[test]
    fn local_embedder_kind_parses() {
        assert_eq!("Hash".parse::<LocalEmbedderKind>(), Ok(LocalEmbedderKind::Hash));
        assert_eq!("ngram".parse::<LocalEmbedderKind>(), Ok(LocalEmbedderKind::Ngram));
        assert!("bert".parse::<LocalEmbedderKind>().is_err());
    }
}
