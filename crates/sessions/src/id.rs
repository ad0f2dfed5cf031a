//! Session identifier generation.

use rand::RngCore;

/// Identifier generation failed; the request that needed it cannot proceed.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum IdGenerationError {
    #[error("randomness source failed: {0}")]
    Randomness(String),

    /// The generated identifier already names a live session.
    #[error("generated session ID {0} is already in use")]
    Collision(String),
}

/// Produces new, practically-unique session identifiers.
pub trait IdGenerator: Send + Sync {
    fn generate(&self) -> Result<String, IdGenerationError>;
}

/// 128 bits from the operating system's randomness source, rendered as a
/// hyphenated UUID v4.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomIds;

impl IdGenerator for RandomIds {
    fn generate(&self) -> Result<String, IdGenerationError> {
        let mut bytes = [0u8; 16];
        rand::rngs::OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(|e| IdGenerationError::Randomness(e.to_string()))?;
        Ok(uuid::Builder::from_random_bytes(bytes)
            .into_uuid()
            .hyphenated()
            .to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_ids_are_v4_uuids() {
        let id = RandomIds.generate().unwrap();
        let parsed = uuid::Uuid::parse_str(&id).unwrap();
        assert_eq!(parsed.get_version_num(), 4);
        assert_eq!(id.len(), 36);
    }

    #[test]
    fn random_ids_differ() {
        let a = RandomIds.generate().unwrap();
        let b = RandomIds.generate().unwrap();
        assert_ne!(a, b);
    }
}
