use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
/// Defines what the config file should contain.
pub struct Config {
    /// The maximum IoU a new detection may have with a tracked box
    /// before one of the two is dropped.
    pub max_overlap: f32,
    /// Detections narrower or shorter than this are never tracked.
    pub min_size: f32,
    /// A freshly seeded track needs at least this correlation to be
    /// kept. A tracked box above this level defends itself against
    /// lower scored detections.
    pub marginal_correlation: f32,
    /// A tracked box is considered lost once its correlation falls
    /// below this threshold.
    pub min_correlation: f32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_overlap: 0.1,
            min_size: 16.0,
            marginal_correlation: 0.75,
            min_correlation: 0.20,
        }
    }
}
