//! Renderer configuration.
use crate::ValidationLayers;
use ash::vk;
use std::{env, str::FromStr};
use thiserror::Error;

/// Environment variable overriding [`RendererConfig::validation`].
pub const VALIDATION_ENV: &str = "RENDERER_VALIDATION";

/// Errors that can occur while reading configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// The validation setting is not one of `require`, `request` or `disable`.
    #[error("invalid validation setting {0:?}, expected require, request or disable")]
    InvalidValidation(String),
}

impl FromStr for ValidationLayers {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "require" => Ok(ValidationLayers::Require),
            "request" => Ok(ValidationLayers::Request),
            "disable" => Ok(ValidationLayers::Disable),
            _ => Err(ConfigError::InvalidValidation(s.to_owned())),
        }
    }
}

/// Window the renderer presents to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowConfig {
    /// Window title.
    pub title: String,
    /// Inner width in physical pixels.
    pub width: u32,
    /// Inner height in physical pixels.
    pub height: u32,
    /// Whether the user may resize the window.
    pub resizable: bool,
}

impl Default for WindowConfig {
    fn default() -> Self {
        WindowConfig {
            title: "Vulkan Environment".to_owned(),
            width: 1920,
            height: 1080,
            resizable: false,
        }
    }
}

/// Everything needed to bootstrap the renderer.
///
/// Defaults enable validation in debug builds only.
#[derive(Debug, Clone)]
pub struct RendererConfig {
    /// Window settings.
    pub window: WindowConfig,
    /// Application name advertised to the driver.
    pub app_name: String,
    /// Application version, `(major, minor, patch)`.
    pub app_version: (u32, u32, u32),
    /// Engine name advertised to the driver.
    pub engine_name: String,
    /// Engine version, `(major, minor, patch)`.
    pub engine_version: (u32, u32, u32),
    /// Instance API version to request, `(major, minor)`.
    pub api_version: (u32, u32),
    /// Validation layer setting.
    pub validation: ValidationLayers,
    /// Create a debug messenger whenever validation isn't disabled.
    pub debug_messenger: bool,
    /// Severities forwarded by the debug messenger.
    pub debug_message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
}

impl Default for RendererConfig {
    fn default() -> Self {
        RendererConfig {
            window: WindowConfig::default(),
            app_name: "Vulkan Renderer".to_owned(),
            app_version: (1, 3, 249),
            engine_name: "No Engine".to_owned(),
            engine_version: (1, 0, 0),
            api_version: (1, 3),
            validation: if cfg!(debug_assertions) {
                ValidationLayers::Request
            } else {
                ValidationLayers::Disable
            },
            debug_messenger: true,
            debug_message_severity: vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
                | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
        }
    }
}

impl RendererConfig {
    /// Create the default configuration.
    #[inline]
    pub fn new() -> Self {
        RendererConfig::default()
    }

    /// Window title.
    #[inline]
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.window.title = title.into();
        self
    }

    /// Window size in physical pixels.
    #[inline]
    pub fn window_size(mut self, width: u32, height: u32) -> Self {
        self.window.width = width;
        self.window.height = height;
        self
    }

    /// Application name to advertise.
    #[inline]
    pub fn app_name(mut self, app_name: impl Into<String>) -> Self {
        self.app_name = app_name.into();
        self
    }

    /// Validation layer setting.
    #[inline]
    pub fn validation(mut self, validation: ValidationLayers) -> Self {
        self.validation = validation;
        self
    }

    /// Enable or disable the debug messenger.
    #[inline]
    pub fn debug_messenger(mut self, enabled: bool) -> Self {
        self.debug_messenger = enabled;
        self
    }

    /// Whether a debug messenger should be requested.
    #[inline]
    pub fn wants_debug_messenger(&self) -> bool {
        self.debug_messenger && self.validation != ValidationLayers::Disable
    }

    /// Apply overrides from the process environment.
    pub fn apply_env(self) -> Result<Self, ConfigError> {
        self.apply_overrides(|key| env::var(key).ok())
    }

    fn apply_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(validation) = lookup(VALIDATION_ENV) {
            self.validation = validation.parse()?;
        }

        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = RendererConfig::default();
        assert_eq!(config.window.title, "Vulkan Environment");
        assert_eq!((config.window.width, config.window.height), (1920, 1080));
        assert!(!config.window.resizable);
        assert_eq!(config.app_name, "Vulkan Renderer");
        assert_eq!(config.api_version, (1, 3));
        assert_eq!(
            config.validation == ValidationLayers::Request,
            cfg!(debug_assertions)
        );
    }

    #[test]
    fn parse_validation() {
        assert_eq!("require".parse::<ValidationLayers>(), Ok(ValidationLayers::Require));
        assert_eq!(" Request ".parse::<ValidationLayers>(), Ok(ValidationLayers::Request));
        assert_eq!("DISABLE".parse::<ValidationLayers>(), Ok(ValidationLayers::Disable));
        assert_eq!(
            "sometimes".parse::<ValidationLayers>(),
            Err(ConfigError::InvalidValidation("sometimes".to_owned()))
        );
    }

    #[test]
    fn env_override() {
        let config = RendererConfig::new()
            .validation(ValidationLayers::Disable)
            .apply_overrides(|key| (key == VALIDATION_ENV).then(|| "require".to_owned()))
            .unwrap();
        assert_eq!(config.validation, ValidationLayers::Require);

        let config = RendererConfig::new()
            .validation(ValidationLayers::Disable)
            .apply_overrides(|_| None)
            .unwrap();
        assert_eq!(config.validation, ValidationLayers::Disable);

        let err = RendererConfig::new()
            .apply_overrides(|_| Some("maybe".to_owned()))
            .unwrap_err();
        assert_eq!(err, ConfigError::InvalidValidation("maybe".to_owned()));
    }

    #[test]
    fn debug_messenger_follows_validation() {
        let config = RendererConfig::new().validation(ValidationLayers::Request);
        assert!(config.wants_debug_messenger());
        assert!(!config.clone().debug_messenger(false).wants_debug_messenger());
        assert!(!config
            .validation(ValidationLayers::Disable)
            .wants_debug_messenger());
    }
}
