// ============================================================================
// ENGINE SETTINGS — persisted key=value configuration
// ============================================================================

use std::path::PathBuf;

use image::Rgba;

/// Tunables shared by the viewport controller, effect pipeline and
/// compositor.
#[derive(Clone, Debug, PartialEq)]
pub struct EngineSettings {
    /// Frame-rate the viewport render loop snaps to.
    pub target_fps: u32,
    /// Viewport pan distance per wheel notch, in scaled pixels.
    pub wheel_pan_step: f64,
    /// Family substituted once when a text layer's font fails to load.
    pub fallback_font: String,
    /// Device pixel ratio used for full-resolution compositing.
    pub pixel_ratio: f64,
    /// Frame background; `None` clears to transparent.
    pub background: Option<Rgba<u8>>,
    /// Default snapshot quality, 0–100.
    pub default_quality: u8,
    /// Keep scheduling frames continuously.
    pub animate: bool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            target_fps: 60,
            wheel_pan_step: 20.0,
            fallback_font: "DejaVu Sans".to_string(),
            pixel_ratio: 1.0,
            background: None,
            default_quality: 92,
            animate: true,
        }
    }
}

impl EngineSettings {
    /// Path to the settings file.
    /// On Linux:   ~/.config/layerfx/layerfx_settings.cfg  (XDG_CONFIG_HOME respected)
    /// On Windows: %APPDATA%\LayerFX\layerfx_settings.cfg
    /// On macOS:   ~/Library/Application Support/LayerFX/layerfx_settings.cfg
    /// Fallback:   same directory as the executable.
    pub fn settings_path() -> Option<PathBuf> {
        #[cfg(target_os = "linux")]
        {
            let config_dir = std::env::var("XDG_CONFIG_HOME")
                .map(PathBuf::from)
                .unwrap_or_else(|_| {
                    let home = std::env::var("HOME").unwrap_or_else(|_| "~".to_string());
                    PathBuf::from(home).join(".config")
                })
                .join("layerfx");
            let _ = std::fs::create_dir_all(&config_dir);
            return Some(config_dir.join("layerfx_settings.cfg"));
        }
        #[cfg(target_os = "windows")]
        {
            let appdata = std::env::var("APPDATA")
                .or_else(|_| std::env::var("USERPROFILE"))
                .unwrap_or_default();
            let config_dir = PathBuf::from(appdata).join("LayerFX");
            let _ = std::fs::create_dir_all(&config_dir);
            return Some(config_dir.join("layerfx_settings.cfg"));
        }
        #[cfg(target_os = "macos")]
        {
            let home = std::env::var("HOME").unwrap_or_else(|_| "~".to_string());
            let config_dir = PathBuf::from(home)
                .join("Library")
                .join("Application Support")
                .join("LayerFX");
            let _ = std::fs::create_dir_all(&config_dir);
            return Some(config_dir.join("layerfx_settings.cfg"));
        }
        #[cfg(not(any(target_os = "linux", target_os = "windows", target_os = "macos")))]
        {
            std::env::current_exe().ok().and_then(|p| p.parent().map(|d| d.join("layerfx_settings.cfg")))
        }
    }

    fn color_to_str(c: Option<Rgba<u8>>) -> String {
        match c {
            Some(c) => format!("{},{},{},{}", c[0], c[1], c[2], c[3]),
            None => "none".to_string(),
        }
    }

    fn str_to_color(s: &str) -> Option<Rgba<u8>> {
        let parts: Vec<&str> = s.split(',').collect();
        if parts.len() == 4 {
            let r = parts[0].trim().parse::<u8>().ok()?;
            let g = parts[1].trim().parse::<u8>().ok()?;
            let b = parts[2].trim().parse::<u8>().ok()?;
            let a = parts[3].trim().parse::<u8>().ok()?;
            Some(Rgba([r, g, b, a]))
        } else {
            None
        }
    }

    /// Serialized `key=value` form.
    pub fn to_config_string(&self) -> String {
        format!(
            "target_fps={}\n\
             wheel_pan_step={}\n\
             fallback_font={}\n\
             pixel_ratio={}\n\
             background={}\n\
             default_quality={}\n\
             animate={}\n",
            self.target_fps,
            self.wheel_pan_step,
            self.fallback_font,
            self.pixel_ratio,
            Self::color_to_str(self.background),
            self.default_quality,
            self.animate,
        )
    }

    /// Save settings to disk.
    pub fn save(&self) {
        let Some(path) = Self::settings_path() else { return };
        if let Err(e) = std::fs::write(&path, self.to_config_string()) {
            log_warn!("Could not save settings to {}: {}", path.display(), e);
        }
    }

    /// Load settings from disk (returns default if file missing or corrupt).
    pub fn load() -> Self {
        let Some(path) = Self::settings_path() else { return Self::default() };
        let Ok(content) = std::fs::read_to_string(&path) else { return Self::default() };
        Self::parse(&content)
    }

    /// Parse `key=value` lines; unknown keys are ignored and bad values keep
    /// their defaults.
    pub fn parse(content: &str) -> Self {
        let mut s = Self::default();
        for line in content.lines() {
            let Some((key, val)) = line.split_once('=') else { continue };
            let key = key.trim();
            let val = val.trim();
            match key {
                "target_fps" => {
                    s.target_fps = val.parse().ok().filter(|&f| f > 0).unwrap_or(60);
                }
                "wheel_pan_step" => {
                    s.wheel_pan_step = val.parse().ok().filter(|v: &f64| v.is_finite()).unwrap_or(20.0);
                }
                "fallback_font" => {
                    if !val.is_empty() {
                        s.fallback_font = val.to_string();
                    }
                }
                "pixel_ratio" => {
                    s.pixel_ratio = val.parse().ok().filter(|v: &f64| v.is_finite() && *v > 0.0).unwrap_or(1.0);
                }
                "background" => {
                    s.background = Self::str_to_color(val);
                }
                "default_quality" => {
                    s.default_quality = val.parse::<u8>().map(|q| q.min(100)).unwrap_or(92);
                }
                "animate" => {
                    s.animate = val == "true";
                }
                _ => {}
            }
        }
        s
    }

    /// Milliseconds between frames at `target_fps`.
    pub fn render_interval(&self) -> f64 {
        1000.0 / self.target_fps.max(1) as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_config_string() {
        let s = EngineSettings {
            target_fps: 30,
            wheel_pan_step: 35.5,
            fallback_font: "Liberation Sans".into(),
            pixel_ratio: 2.0,
            background: Some(Rgba([10, 20, 30, 255])),
            default_quality: 75,
            animate: false,
        };
        assert_eq!(EngineSettings::parse(&s.to_config_string()), s);
    }

    #[test]
    fn corrupt_values_keep_defaults() {
        let s = EngineSettings::parse("target_fps=0\npixel_ratio=-1\nbackground=1,2\ngarbage\ndefault_quality=abc\n");
        assert_eq!(s, EngineSettings::default());
    }

    #[test]
    fn render_interval_from_fps() {
        let s = EngineSettings { target_fps: 50, ..Default::default() };
        assert_eq!(s.render_interval(), 20.0);
    }
}
