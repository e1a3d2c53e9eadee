//! Plot configuration model
//!
//! The closed, serializable description of a figure. Renderers and the script
//! emitter both read it; nothing here draws.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::{DpsError, Result};

mod channels;

pub use channels::ChannelRequirement;

/// Supported plot kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlotType {
    #[default]
    Line,
    Scatter,
    Bar,
    Histogram,
    Box,
    Violin,
    Kde,
    Area,
    Pie,
    Count,
    Hexbin,
    #[serde(rename = "density_2d")]
    Density2d,
}

impl PlotType {
    pub const ALL: [PlotType; 12] = [
        PlotType::Line,
        PlotType::Scatter,
        PlotType::Bar,
        PlotType::Histogram,
        PlotType::Box,
        PlotType::Violin,
        PlotType::Kde,
        PlotType::Area,
        PlotType::Pie,
        PlotType::Count,
        PlotType::Hexbin,
        PlotType::Density2d,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            PlotType::Line => "line",
            PlotType::Scatter => "scatter",
            PlotType::Bar => "bar",
            PlotType::Histogram => "histogram",
            PlotType::Box => "box",
            PlotType::Violin => "violin",
            PlotType::Kde => "kde",
            PlotType::Area => "area",
            PlotType::Pie => "pie",
            PlotType::Count => "count",
            PlotType::Hexbin => "hexbin",
            PlotType::Density2d => "density_2d",
        }
    }
}

/// Data channels: which columns feed the plot
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BasicChannels {
    pub x: Option<String>,
    pub y: Vec<String>,
    pub hue: Option<String>,
    /// Name of a subset to plot instead of the full table
    pub subset: Option<String>,
}

/// A title or axis label that can be switched off without losing its text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Label {
    pub text: String,
    pub enabled: bool,
    pub font_size: Option<f64>,
}

impl Default for Label {
    fn default() -> Self {
        Self {
            text: String::new(),
            enabled: true,
            font_size: None,
        }
    }
}

impl Label {
    /// The text to draw, if any
    pub fn visible_text(&self) -> Option<&str> {
        if self.enabled && !self.text.is_empty() {
            Some(&self.text)
        } else {
            None
        }
    }
}

/// Figure-wide appearance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Appearance {
    /// Figure width in inches
    pub figure_width: f64,
    /// Figure height in inches
    pub figure_height: f64,
    pub dpi: u32,
    pub font_family: String,
    pub font_size: f64,
    /// Named color palette
    pub palette: String,
    pub title: Label,
    pub x_label: Label,
    pub y_label: Label,
    pub line_width: f64,
    pub marker_size: f64,
    /// Opacity in `[0, 1]`
    pub alpha: f64,
}

impl Default for Appearance {
    fn default() -> Self {
        Self {
            figure_width: 10.0,
            figure_height: 6.0,
            dpi: 100,
            font_family: "sans-serif".to_string(),
            font_size: 10.0,
            palette: "tab10".to_string(),
            title: Label::default(),
            x_label: Label::default(),
            y_label: Label::default(),
            line_width: 1.5,
            marker_size: 36.0,
            alpha: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AxisScale {
    #[default]
    Linear,
    Log,
    Symlog,
    Logit,
}

impl AxisScale {
    pub fn name(&self) -> &'static str {
        match self {
            AxisScale::Linear => "linear",
            AxisScale::Log => "log",
            AxisScale::Symlog => "symlog",
            AxisScale::Logit => "logit",
        }
    }
}

/// One axis: limits, scale, ticks and formatting
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AxisConfig {
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub scale: AxisScale,
    /// Tick label rotation in degrees
    pub tick_rotation: f64,
    /// Maximum number of major ticks
    pub tick_count: Option<usize>,
    pub tick_font_size: Option<f64>,
    /// strftime pattern for temporal axes
    pub datetime_format: Option<String>,
    pub invert: bool,
}

impl AxisConfig {
    pub fn has_limits(&self) -> bool {
        self.min.is_some() || self.max.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Spines {
    pub top: bool,
    pub right: bool,
    pub bottom: bool,
    pub left: bool,
}

impl Default for Spines {
    fn default() -> Self {
        Self {
            top: true,
            right: true,
            bottom: true,
            left: true,
        }
    }
}

impl Spines {
    /// Names of the spines switched off
    pub fn hidden(&self) -> Vec<&'static str> {
        [
            ("top", self.top),
            ("right", self.right),
            ("bottom", self.bottom),
            ("left", self.left),
        ]
        .into_iter()
        .filter(|(_, visible)| !visible)
        .map(|(name, _)| name)
        .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AxesConfig {
    pub x: AxisConfig,
    pub y: AxisConfig,
    /// Swap the roles of x and y (horizontal bars, boxes, violins)
    pub flip: bool,
    pub spines: Spines,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GridAxis {
    #[default]
    Both,
    X,
    Y,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GridWhich {
    #[default]
    Major,
    Minor,
    Both,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    pub enabled: bool,
    pub axis: GridAxis,
    pub which: GridWhich,
    pub line_style: String,
    pub alpha: f64,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            axis: GridAxis::Both,
            which: GridWhich::Major,
            line_style: "--".to_string(),
            alpha: 0.3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LegendConfig {
    pub enabled: bool,
    /// matplotlib location string ("best", "upper right", ...)
    pub location: String,
    pub title: Option<String>,
    pub frame: bool,
    pub columns: usize,
}

impl Default for LegendConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            location: "best".to_string(),
            title: None,
            frame: true,
            columns: 1,
        }
    }
}

/// Free text placed at data coordinates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextBox {
    pub text: String,
    pub x: f64,
    pub y: f64,
    pub font_size: f64,
    pub color: String,
    /// Draw a rounded box behind the text
    pub boxed: bool,
}

impl Default for TextBox {
    fn default() -> Self {
        Self {
            text: String::new(),
            x: 0.0,
            y: 0.0,
            font_size: 10.0,
            color: "black".to_string(),
            boxed: true,
        }
    }
}

/// Text anchored to a corner of the axes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnchoredText {
    pub text: String,
    pub location: String,
    pub font_size: f64,
}

impl Default for AnchoredText {
    fn default() -> Self {
        Self {
            text: String::new(),
            location: "upper left".to_string(),
            font_size: 10.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Annotations {
    pub text_boxes: Vec<TextBox>,
    pub anchored: Vec<AnchoredText>,
}

impl Annotations {
    pub fn is_empty(&self) -> bool {
        self.text_boxes.is_empty() && self.anchored.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorBars {
    #[default]
    None,
    Stddev,
    Stderr,
}

/// Statistical overlays
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub regression: bool,
    pub confidence_interval: bool,
    /// Confidence level in `(0, 1)`
    pub confidence_level: f64,
    pub show_r2: bool,
    pub show_rmse: bool,
    pub show_equation: bool,
    pub error_bars: ErrorBars,
    pub histogram_bins: usize,
    pub normal_fit: bool,
    pub kde_overlay: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            regression: false,
            confidence_interval: false,
            confidence_level: 0.95,
            show_r2: false,
            show_rmse: false,
            show_equation: false,
            error_bars: ErrorBars::None,
            histogram_bins: 30,
            normal_fit: false,
            kde_overlay: false,
        }
    }
}

impl AnalysisConfig {
    /// Whether any overlay needs a fitted regression line
    pub fn needs_fit(&self) -> bool {
        self.regression || self.confidence_interval || self.show_r2 || self.show_rmse || self.show_equation
    }
}

/// Complete plot specification
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PlotConfig {
    pub plot_type: PlotType,
    pub basic: BasicChannels,
    pub appearance: Appearance,
    pub axes: AxesConfig,
    pub grid: GridConfig,
    pub legend: LegendConfig,
    pub annotations: Annotations,
    pub analysis: AnalysisConfig,
}

impl PlotConfig {
    pub fn new(plot_type: PlotType) -> Self {
        Self {
            plot_type,
            ..Self::default()
        }
    }

    /// Read a config from loosely structured JSON
    ///
    /// Unknown keys are dropped and missing keys take their defaults; enum
    /// values outside their closed sets are rejected.
    pub fn from_value(value: JsonValue) -> Result<Self> {
        if value.is_null() {
            return Ok(Self::default());
        }
        let config: PlotConfig = serde_json::from_value(value)
            .map_err(|e| DpsError::InvalidOperation(format!("Invalid plot config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_value(&self) -> Result<JsonValue> {
        Ok(serde_json::to_value(self)?)
    }

    /// True when no data channel has been chosen yet
    pub fn is_empty(&self) -> bool {
        self.basic.x.is_none() && self.basic.y.is_empty()
    }

    /// Check numeric ranges
    pub fn validate(&self) -> Result<()> {
        let appearance = &self.appearance;
        if appearance.dpi == 0 {
            return Err(invalid("dpi must be positive"));
        }
        if appearance.figure_width <= 0.0 || appearance.figure_height <= 0.0 {
            return Err(invalid("figure size must be positive"));
        }
        if !(0.0..=1.0).contains(&appearance.alpha) {
            return Err(invalid("alpha must be between 0 and 1"));
        }
        let level = self.analysis.confidence_level;
        if !(level > 0.0 && level < 1.0) {
            return Err(invalid("confidence level must be between 0 and 1"));
        }
        if self.analysis.histogram_bins == 0 {
            return Err(invalid("histogram bins must be positive"));
        }
        for axis in [&self.axes.x, &self.axes.y] {
            if let (Some(min), Some(max)) = (axis.min, axis.max) {
                if min >= max {
                    return Err(invalid("axis minimum must be below its maximum"));
                }
            }
        }
        Ok(())
    }

    /// Check that the channels required by the plot type are filled
    pub fn validate_channels(&self) -> Result<()> {
        channels::check(self)
    }

    /// Every column the config refers to, in channel order
    pub fn referenced_columns(&self) -> Vec<&str> {
        let basic = &self.basic;
        let mut columns: Vec<&str> = Vec::new();
        for name in basic.x.iter().chain(basic.y.iter()).chain(basic.hue.iter()) {
            if !columns.contains(&name.as_str()) {
                columns.push(name);
            }
        }
        columns
    }

    /// Whether either axis carries a date format
    pub fn uses_datetime_axis(&self) -> bool {
        self.axes.x.datetime_format.is_some() || self.axes.y.datetime_format.is_some()
    }
}

fn invalid(message: &str) -> DpsError {
    DpsError::InvalidOperation(format!("Invalid plot config: {}", message))
}
