use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::error::{RenderGraphError, RenderGraphResult};

/// render graph 的运行参数
///
/// 可以从 toml 中读取，缺省的字段使用默认值：
///
/// ```toml
/// frames_in_flight = 2
/// clear_color = [0.1, 0.1, 0.1, 1.0]
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderGraphSettings {
    /// frames in flight 数量，决定 fence/semaphore 以及 command buffer slot 的数量
    pub frames_in_flight: usize,
    /// start_frame 等待 slot fence 的超时，单位纳秒
    pub fence_timeout_ns: u64,
    pub acquire_timeout_ns: u64,

    pub clear_color: [f32; 4],
    pub clear_depth: f32,
    pub clear_stencil: u32,

    /// 生成 shading rate image 的 compute shader 的 local size（x 与 y 相同）
    pub shading_rate_workgroup_size: u32,
}

impl Default for RenderGraphSettings {
    fn default() -> Self {
        Self {
            frames_in_flight: 3,
            fence_timeout_ns: u64::MAX,
            acquire_timeout_ns: u64::MAX,
            clear_color: [0.0, 0.0, 0.0, 1.0],
            clear_depth: 1.0,
            clear_stencil: 0,
            shading_rate_workgroup_size: 16,
        }
    }
}

impl RenderGraphSettings {
    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let settings: Self = toml::from_str(content).context("failed to parse render graph settings")?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read render graph settings from {}", path.display()))?;
        Self::from_toml_str(&content).with_context(|| format!("in settings file {}", path.display()))
    }

    pub fn validate(&self) -> RenderGraphResult<()> {
        if self.frames_in_flight == 0 {
            return Err(RenderGraphError::InvalidSettings("frames_in_flight must be positive".to_string()));
        }
        if self.shading_rate_workgroup_size == 0 {
            return Err(RenderGraphError::InvalidSettings(
                "shading_rate_workgroup_size must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_fields_use_defaults() {
        let settings = RenderGraphSettings::from_toml_str("frames_in_flight = 2\nclear_depth = 0.0\n").unwrap();
        assert_eq!(settings.frames_in_flight, 2);
        assert_eq!(settings.clear_depth, 0.0);
        assert_eq!(settings.fence_timeout_ns, u64::MAX);
        assert_eq!(settings.clear_color, [0.0, 0.0, 0.0, 1.0]);
        assert_eq!(settings.shading_rate_workgroup_size, 16);
    }

    #[test]
    fn test_empty_document_is_default() {
        assert_eq!(RenderGraphSettings::from_toml_str("").unwrap(), RenderGraphSettings::default());
    }

    #[test]
    fn test_zero_frames_in_flight_rejected() {
        let err = RenderGraphSettings::from_toml_str("frames_in_flight = 0").unwrap_err();
        assert!(format!("{err:#}").contains("frames_in_flight"));
    }

    #[test]
    fn test_zero_workgroup_rejected() {
        let settings = RenderGraphSettings {
            shading_rate_workgroup_size: 0,
            ..Default::default()
        };
        assert!(matches!(settings.validate(), Err(RenderGraphError::InvalidSettings(_))));
    }

    #[test]
    fn test_missing_file_has_context() {
        let err = RenderGraphSettings::from_file("/nonexistent/prism-settings.toml").unwrap_err();
        assert!(err.to_string().contains("prism-settings.toml"));
    }
}
