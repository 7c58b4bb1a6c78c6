//! Default configuration values
//!
//! All constants used throughout the config module are defined here.

/// Preference keys, kept identical across front ends so one store can serve all of them
pub const KEY_REGISTERED_FOLDERS: &str = "RegisteredFolders";
pub const KEY_PYTHON_PATH: &str = "PythonPath";
pub const KEY_ICON_SIZE: &str = "IconSize";
pub const KEY_FONT_SIZE: &str = "FontSize";
pub const KEY_UI_SCALE: &str = "UIScale";
pub const KEY_THEME_MODE: &str = "ThemeMode";

/// Default interpreter preference. Empty means "unset", so the
/// per-OS fallback interpreter applies.
pub const DEFAULT_PYTHON_PATH: &str = "";

/// Default presentation values
pub const DEFAULT_ICON_SIZE: f64 = 80.0;
pub const DEFAULT_FONT_SIZE: f64 = 12.0;
pub const DEFAULT_UI_SCALE: f64 = 0.9;

/// Default preferences file location
pub const DEFAULT_PREFERENCES_PATH: &str = "~/.quickbox/preferences.json";

/// Environment variable overriding the preferences file location
pub const PREFERENCES_PATH_ENV: &str = "QUICKBOX_PREFS";
