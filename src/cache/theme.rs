//! Theme preference: `system`, `light`, or `dark`, kept in the secure store.
//!
//! Loading yields a [`ResolvedTheme`]: the color scheme to render together
//! with a [`ThemeSetter`] that persists a new choice. Storage failures are
//! logged and fall back to the previous preference.

use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::store::KeyValueStore;

pub const THEME_PREFERENCE_KEY: &str = "eatos_theme_preference";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThemePreference {
    #[default]
    System,
    Light,
    Dark,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorScheme {
    Light,
    Dark,
}

impl ThemePreference {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::Light => "light",
            Self::Dark => "dark",
        }
    }

    /// Resolve against the device scheme. Unknown device schemes render light.
    #[must_use]
    pub fn resolve(self, device: Option<ColorScheme>) -> ColorScheme {
        match self {
            Self::System => device.unwrap_or(ColorScheme::Light),
            Self::Light => ColorScheme::Light,
            Self::Dark => ColorScheme::Dark,
        }
    }
}

impl fmt::Display for ThemePreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ThemePreference {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "system" => Ok(Self::System),
            "light" => Ok(Self::Light),
            "dark" => Ok(Self::Dark),
            other => Err(format!("unknown theme preference '{other}' (expected system, light, or dark)")),
        }
    }
}

/// Reads and writes the theme preference.
#[derive(Clone)]
pub struct ThemeSettings {
    store: Arc<dyn KeyValueStore>,
}

impl ThemeSettings {
    #[must_use]
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// The saved preference, or `System` when absent, unknown, or unreadable.
    pub async fn preference(&self) -> ThemePreference {
        match self.store.get(THEME_PREFERENCE_KEY).await {
            Ok(Some(raw)) => raw.parse::<ThemePreference>().unwrap_or_else(|e: String| {
                warn!(error = %e, "theme: ignoring saved preference");
                ThemePreference::System
            }),
            Ok(None) => ThemePreference::System,
            Err(e) => {
                warn!(error = %e, "theme: failed to load preference");
                ThemePreference::System
            }
        }
    }

    /// Load the preference and resolve it against the device scheme.
    pub async fn load(&self, device: Option<ColorScheme>) -> ResolvedTheme {
        let preference = self.preference().await;
        ResolvedTheme {
            scheme: preference.resolve(device),
            preference,
            set_theme: ThemeSetter { store: self.store.clone(), device, current: Arc::new(Mutex::new(preference)) },
        }
    }
}

/// A resolved color scheme paired with the means to change it.
#[derive(Clone)]
pub struct ResolvedTheme {
    pub scheme: ColorScheme,
    pub preference: ThemePreference,
    pub set_theme: ThemeSetter,
}

impl fmt::Debug for ResolvedTheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedTheme")
            .field("scheme", &self.scheme)
            .field("preference", &self.preference)
            .finish_non_exhaustive()
    }
}

/// The preference in effect after a [`ThemeSetter::set`] and its scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AppliedTheme {
    pub preference: ThemePreference,
    pub scheme: ColorScheme,
}

/// Clones share the last successfully saved preference.
#[derive(Clone)]
pub struct ThemeSetter {
    store: Arc<dyn KeyValueStore>,
    device: Option<ColorScheme>,
    current: Arc<Mutex<ThemePreference>>,
}

impl ThemeSetter {
    /// Persist `preference` and return what is now in effect. If the write
    /// fails the last saved preference stays in effect.
    pub async fn set(&self, preference: ThemePreference) -> AppliedTheme {
        let in_effect = match self.store.set(THEME_PREFERENCE_KEY, preference.as_str()).await {
            Ok(()) => {
                *self.current.lock().unwrap_or_else(PoisonError::into_inner) = preference;
                preference
            }
            Err(e) => {
                warn!(error = %e, %preference, "theme: failed to save preference");
                *self.current.lock().unwrap_or_else(PoisonError::into_inner)
            }
        };
        AppliedTheme { preference: in_effect, scheme: in_effect.resolve(self.device) }
    }
}

#[cfg(test)]
#[path = "theme_test.rs"]
mod tests;
