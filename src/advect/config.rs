//! Tunables of the parallel advection loop.

use crate::algs::communicator::CommTag;
use crate::mesh_error::MeshAdvectError;

/// Tags used by one advection run; both sides of a run must agree on them.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct AdvectCommTags {
    pub curves: CommTag,
    pub control: CommTag,
}

impl AdvectCommTags {
    pub const fn from_base(base: CommTag) -> Self {
        Self {
            curves: base,
            control: base.offset(1),
        }
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct AdvectConfig {
    /// Curves advanced per iteration before communication is serviced.
    pub max_count: usize,
    /// Terminate a curve with `MaxSteps` once it has taken this many steps.
    pub max_steps: Option<u32>,
    /// Keep the full trajectory on each curve.
    pub record_history: bool,
    /// Base message tag; the control tag is `tag_base + 1`.
    pub tag_base: u16,
}

impl Default for AdvectConfig {
    fn default() -> Self {
        Self {
            max_count: 10,
            max_steps: None,
            record_history: true,
            tag_base: 0x4943,
        }
    }
}

impl AdvectConfig {
    pub fn with_max_count(mut self, max_count: usize) -> Self {
        self.max_count = max_count;
        self
    }

    pub fn with_max_steps(mut self, max_steps: u32) -> Self {
        self.max_steps = Some(max_steps);
        self
    }

    pub fn with_history(mut self, record: bool) -> Self {
        self.record_history = record;
        self
    }

    pub fn tags(&self) -> AdvectCommTags {
        AdvectCommTags::from_base(CommTag::new(self.tag_base))
    }

    pub fn validate(&self) -> Result<(), MeshAdvectError> {
        if self.max_count == 0 {
            return Err(MeshAdvectError::InvalidConfig(
                "max_count must be at least 1".into(),
            ));
        }
        if self.tag_base == u16::MAX {
            return Err(MeshAdvectError::InvalidConfig(
                "tag_base leaves no room for the control tag".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        AdvectConfig::default().validate().unwrap();
        assert!(AdvectConfig::default().with_max_count(0).validate().is_err());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let cfg: AdvectConfig = serde_json::from_str(r#"{"max_count": 3}"#).unwrap();
        assert_eq!(cfg.max_count, 3);
        assert_eq!(cfg.tag_base, AdvectConfig::default().tag_base);
        let tags = cfg.tags();
        assert_eq!(tags.control.as_u16(), tags.curves.as_u16() + 1);
    }
}
