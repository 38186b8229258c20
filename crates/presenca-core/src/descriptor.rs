//! 128-dimensional face descriptor produced by the embedding library.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Length of every descriptor the embedding library produces.
pub const DESCRIPTOR_LEN: usize = 128;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DescriptorError {
    #[error("descriptor must have {DESCRIPTOR_LEN} values, got {0}")]
    WrongLength(usize),
    #[error("descriptor value at index {0} is not finite")]
    NonFinite(usize),
}

/// A unit face embedding. Always exactly [`DESCRIPTOR_LEN`] finite values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f32>", into = "Vec<f32>")]
pub struct FaceDescriptor {
    values: Vec<f32>,
}

impl FaceDescriptor {
    pub fn new(values: Vec<f32>) -> Result<Self, DescriptorError> {
        if values.len() != DESCRIPTOR_LEN {
            return Err(DescriptorError::WrongLength(values.len()));
        }
        if let Some(idx) = values.iter().position(|v| !v.is_finite()) {
            return Err(DescriptorError::NonFinite(idx));
        }
        Ok(Self { values })
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    /// Euclidean distance between two descriptors.
    pub fn euclidean_distance(&self, other: &FaceDescriptor) -> f32 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }
}

impl TryFrom<Vec<f32>> for FaceDescriptor {
    type Error = DescriptorError;

    fn try_from(values: Vec<f32>) -> Result<Self, Self::Error> {
        FaceDescriptor::new(values)
    }
}

impl From<FaceDescriptor> for Vec<f32> {
    fn from(d: FaceDescriptor) -> Self {
        d.values
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled(v: f32) -> FaceDescriptor {
        FaceDescriptor::new(vec![v; DESCRIPTOR_LEN]).unwrap()
    }

    #[test]
    fn test_rejects_wrong_length() {
        assert_eq!(
            FaceDescriptor::new(vec![0.0; 127]),
            Err(DescriptorError::WrongLength(127))
        );
    }

    #[test]
    fn test_rejects_non_finite() {
        let mut values = vec![0.1; DESCRIPTOR_LEN];
        values[42] = f32::INFINITY;
        assert_eq!(
            FaceDescriptor::new(values),
            Err(DescriptorError::NonFinite(42))
        );
    }

    #[test]
    fn test_self_distance_is_zero() {
        let d = filled(0.3);
        assert_eq!(d.euclidean_distance(&d), 0.0);
    }

    #[test]
    fn test_distance_known_value() {
        // 128 components each differing by 0.05 -> sqrt(128 * 0.0025) = sqrt(0.32)
        let a = filled(0.10);
        let b = filled(0.15);
        let expected = (DESCRIPTOR_LEN as f32 * 0.05f32.powi(2)).sqrt();
        assert!((a.euclidean_distance(&b) - expected).abs() < 1e-4);
    }

    #[test]
    fn test_json_is_plain_array_and_validated() {
        let d = filled(0.25);
        let json = serde_json::to_string(&d).unwrap();
        assert!(json.starts_with('['));
        let back: FaceDescriptor = serde_json::from_str(&json).unwrap();
        assert_eq!(back, d);

        assert!(serde_json::from_str::<FaceDescriptor>("[0.1, 0.2]").is_err());
    }
}
