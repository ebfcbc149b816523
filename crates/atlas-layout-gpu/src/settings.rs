//! Layout configuration.
//!
//! Settings serialize with camelCase names. Every field has a default, so a
//! partial JSON document such as `{"gravity": 0.5}` is a complete settings
//! object.

use serde::{Deserialize, Serialize};

use crate::morton::MAX_DEPTH;
use crate::{LayoutError, Result};

/// Repulsion strategy, baked into the force kernel at compile time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum RepulsionSettings {
    /// Exact O(n²) pairwise repulsion.
    #[default]
    AllPairs,
    /// Barnes-Hut over the on-device spatial index.
    QuadTree {
        /// Subdivision depth in [1, 4].
        #[serde(default = "default_depth")]
        depth: u32,
        /// Opening angle; larger is coarser.
        #[serde(default = "default_theta")]
        theta: f32,
    },
    /// One body per k-means centroid.
    #[serde(rename = "kMeans")]
    KMeans {
        centroids: usize,
        /// Assignment/recentering rounds per batch.
        #[serde(default = "default_steps")]
        steps: u32,
    },
    /// Other centroids as bodies plus exact repulsion inside one's own cluster.
    #[serde(rename = "kMeansGrouped")]
    KMeansGrouped {
        centroids: usize,
        #[serde(default = "default_steps")]
        steps: u32,
    },
}

fn default_depth() -> u32 {
    MAX_DEPTH
}

fn default_theta() -> f32 {
    0.5
}

fn default_steps() -> u32 {
    1
}

impl RepulsionSettings {
    /// Centroid count for the k-means strategies.
    pub fn centroids(&self) -> Option<usize> {
        match self {
            RepulsionSettings::KMeans { centroids, .. }
            | RepulsionSettings::KMeansGrouped { centroids, .. } => Some(*centroids),
            _ => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            RepulsionSettings::AllPairs => "allPairs",
            RepulsionSettings::QuadTree { .. } => "quadTree",
            RepulsionSettings::KMeans { .. } => "kMeans",
            RepulsionSettings::KMeansGrouped { .. } => "kMeansGrouped",
        }
    }
}

/// ForceAtlas2 parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutSettings {
    /// Log-distance attraction.
    #[serde(default)]
    pub lin_log_mode: bool,
    /// Gravity independent of distance to the origin.
    #[serde(default)]
    pub strong_gravity_mode: bool,
    /// Anti-collision using node sizes.
    #[serde(default)]
    pub adjust_sizes: bool,
    /// Divide attraction by source mass (hubs pushed to the periphery).
    #[serde(default)]
    pub outbound_attraction_distribution: bool,
    /// Exponent applied to edge weights; 0 ignores weights.
    #[serde(default = "default_one")]
    pub edge_weight_influence: f32,
    /// Repulsion strength.
    #[serde(default = "default_one")]
    pub scaling_ratio: f32,
    #[serde(default = "default_one")]
    pub gravity: f32,
    /// Divides every displacement; larger is slower and steadier.
    #[serde(default = "default_one")]
    pub slow_down: f32,
    /// Upper bound on a node's force magnitude.
    #[serde(default = "default_max_force")]
    pub max_force: f32,
    /// Physics passes per batch (one readback per batch).
    #[serde(default = "default_iterations")]
    pub iterations_per_step: u32,
    #[serde(default)]
    pub repulsion: RepulsionSettings,
    /// Wait for the device to drain before each readback.
    #[serde(default)]
    pub await_device: bool,
}

fn default_one() -> f32 {
    1.0
}

fn default_max_force() -> f32 {
    10.0
}

fn default_iterations() -> u32 {
    1
}

impl Default for LayoutSettings {
    fn default() -> Self {
        Self {
            lin_log_mode: false,
            strong_gravity_mode: false,
            adjust_sizes: false,
            outbound_attraction_distribution: false,
            edge_weight_influence: default_one(),
            scaling_ratio: default_one(),
            gravity: default_one(),
            slow_down: default_one(),
            max_force: default_max_force(),
            iterations_per_step: default_iterations(),
            repulsion: RepulsionSettings::default(),
            await_device: false,
        }
    }
}

impl LayoutSettings {
    /// Heuristic settings for a graph of `node_count` nodes.
    pub fn infer(node_count: usize) -> Self {
        let n = node_count.max(1) as f32;
        Self {
            strong_gravity_mode: true,
            gravity: 0.05,
            scaling_ratio: 10.0,
            slow_down: 1.0 + n.ln(),
            repulsion: if node_count > 2000 {
                RepulsionSettings::QuadTree {
                    depth: MAX_DEPTH,
                    theta: default_theta(),
                }
            } else {
                RepulsionSettings::AllPairs
            },
            ..Self::default()
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Checks that do not depend on the graph.
    pub fn validate(&self) -> Result<()> {
        non_negative("edgeWeightInfluence", self.edge_weight_influence)?;
        non_negative("scalingRatio", self.scaling_ratio)?;
        non_negative("gravity", self.gravity)?;
        positive("slowDown", self.slow_down)?;
        positive("maxForce", self.max_force)?;
        if self.iterations_per_step == 0 {
            return Err(LayoutError::config(
                "iterationsPerStep",
                "must be at least 1",
            ));
        }

        match &self.repulsion {
            RepulsionSettings::AllPairs => {}
            RepulsionSettings::QuadTree { depth, theta } => {
                if !(1..=MAX_DEPTH).contains(depth) {
                    return Err(LayoutError::config(
                        "repulsion.depth",
                        format!("depth {depth} is outside [1, {MAX_DEPTH}]"),
                    ));
                }
                non_negative("repulsion.theta", *theta)?;
            }
            RepulsionSettings::KMeans { centroids, steps }
            | RepulsionSettings::KMeansGrouped { centroids, steps } => {
                if *centroids == 0 {
                    return Err(LayoutError::config(
                        "repulsion.centroids",
                        "at least one centroid is required",
                    ));
                }
                if *steps == 0 {
                    return Err(LayoutError::config("repulsion.steps", "must be at least 1"));
                }
            }
        }
        Ok(())
    }

    /// Full validation against a graph of `node_count` nodes.
    pub fn validate_for(&self, node_count: usize) -> Result<()> {
        self.validate()?;
        if let Some(centroids) = self.repulsion.centroids() {
            if centroids > node_count {
                return Err(LayoutError::config(
                    "repulsion.centroids",
                    format!("{centroids} centroids for {node_count} nodes"),
                ));
            }
        }
        Ok(())
    }
}

fn non_negative(field: &'static str, value: f32) -> Result<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(LayoutError::config(
            field,
            format!("must be finite and non-negative, got {value}"),
        ))
    }
}

fn positive(field: &'static str, value: f32) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(LayoutError::config(
            field,
            format!("must be finite and positive, got {value}"),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let settings = LayoutSettings::default();
        assert!(settings.validate_for(1).is_ok());
        assert_eq!(settings.max_force, 10.0);
        assert_eq!(settings.repulsion, RepulsionSettings::AllPairs);
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let settings = LayoutSettings::from_json(
            r#"{"gravity": 0.5, "linLogMode": true, "repulsion": {"kind": "quadTree", "depth": 3}}"#,
        )
        .unwrap();
        assert_eq!(settings.gravity, 0.5);
        assert!(settings.lin_log_mode);
        assert_eq!(settings.scaling_ratio, 1.0);
        assert_eq!(
            settings.repulsion,
            RepulsionSettings::QuadTree {
                depth: 3,
                theta: 0.5
            }
        );
    }

    #[test]
    fn test_json_roundtrip_keeps_kmeans_tag() {
        let settings = LayoutSettings {
            repulsion: RepulsionSettings::KMeansGrouped {
                centroids: 8,
                steps: 2,
            },
            ..LayoutSettings::default()
        };
        let json = settings.to_json().unwrap();
        assert!(json.contains(r#""kind": "kMeansGrouped""#));
        assert!(json.contains(r#""iterationsPerStep": 1"#));
        assert_eq!(LayoutSettings::from_json(&json).unwrap(), settings);
    }

    #[test]
    fn test_depth_out_of_range_is_rejected() {
        for depth in [0, 5] {
            let settings = LayoutSettings {
                repulsion: RepulsionSettings::QuadTree { depth, theta: 0.5 },
                ..LayoutSettings::default()
            };
            assert!(matches!(
                settings.validate(),
                Err(LayoutError::InvalidConfig { field: "repulsion.depth", .. })
            ));
        }
    }

    #[test]
    fn test_centroid_count_is_bounded_by_nodes() {
        let settings = LayoutSettings {
            repulsion: RepulsionSettings::KMeans {
                centroids: 5,
                steps: 1,
            },
            ..LayoutSettings::default()
        };
        assert!(settings.validate_for(5).is_ok());
        assert!(settings.validate_for(4).is_err());

        let zero = LayoutSettings {
            repulsion: RepulsionSettings::KMeans {
                centroids: 0,
                steps: 1,
            },
            ..LayoutSettings::default()
        };
        assert!(zero.validate().is_err());
    }

    #[test]
    fn test_scalar_checks() {
        let settings = LayoutSettings {
            slow_down: 0.0,
            ..LayoutSettings::default()
        };
        assert!(settings.validate().is_err());
        let settings = LayoutSettings {
            gravity: f32::NAN,
            ..LayoutSettings::default()
        };
        assert!(settings.validate().is_err());
        let settings = LayoutSettings {
            iterations_per_step: 0,
            ..LayoutSettings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_infer_switches_to_quad_tree_for_large_graphs() {
        let small = LayoutSettings::infer(100);
        assert_eq!(small.repulsion, RepulsionSettings::AllPairs);
        assert!(small.strong_gravity_mode);
        assert!((small.slow_down - (1.0 + 100f32.ln())).abs() < 1e-5);

        let large = LayoutSettings::infer(5000);
        assert_eq!(
            large.repulsion,
            RepulsionSettings::QuadTree {
                depth: 4,
                theta: 0.5
            }
        );
        assert!(large.validate_for(5000).is_ok());
    }
}
