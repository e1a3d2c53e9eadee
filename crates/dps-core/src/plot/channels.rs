//! Required channels per plot type

use super::{PlotConfig, PlotType};
use crate::error::{DpsError, Result};

/// What a plot type needs from the x and y channels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelRequirement {
    /// x plus one or more y columns
    XAndManyY,
    /// x plus exactly one y column
    XAndOneY,
    /// A single value column on the value axis
    OneValue,
    /// A single category column on the category axis
    OneCategory,
}

impl ChannelRequirement {
    pub fn for_type(plot_type: PlotType) -> Self {
        match plot_type {
            PlotType::Line | PlotType::Area | PlotType::Bar => ChannelRequirement::XAndManyY,
            PlotType::Scatter | PlotType::Hexbin | PlotType::Density2d | PlotType::Pie => {
                ChannelRequirement::XAndOneY
            }
            PlotType::Histogram | PlotType::Box | PlotType::Violin | PlotType::Kde => ChannelRequirement::OneValue,
            PlotType::Count => ChannelRequirement::OneCategory,
        }
    }
}

pub(super) fn check(config: &PlotConfig) -> Result<()> {
    let basic = &config.basic;
    let plot = config.plot_type.name();
    let missing = |what: &str| DpsError::InvalidOperation(format!("A {} plot needs {}", plot, what));

    match ChannelRequirement::for_type(config.plot_type) {
        ChannelRequirement::XAndManyY => {
            if basic.x.is_none() {
                return Err(missing("an x column"));
            }
            if basic.y.is_empty() {
                return Err(missing("at least one y column"));
            }
        }
        ChannelRequirement::XAndOneY => {
            if basic.x.is_none() {
                return Err(missing("an x column"));
            }
            if basic.y.len() != 1 {
                return Err(missing("exactly one y column"));
            }
        }
        ChannelRequirement::OneValue => {
            // Histograms always read y; the others read x when flipped
            let has_value = if config.axes.flip && config.plot_type != PlotType::Histogram {
                basic.x.is_some()
            } else {
                basic.y.len() == 1
            };
            if !has_value {
                return Err(missing("a single value column"));
            }
        }
        ChannelRequirement::OneCategory => {
            let has_category = if config.axes.flip {
                basic.y.len() == 1
            } else {
                basic.x.is_some()
            };
            if !has_category {
                return Err(missing("a category column"));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(plot_type: PlotType, x: Option<&str>, y: &[&str]) -> PlotConfig {
        let mut config = PlotConfig::new(plot_type);
        config.basic.x = x.map(String::from);
        config.basic.y = y.iter().map(|s| s.to_string()).collect();
        config
    }

    #[test]
    fn test_line_needs_x_and_y() {
        assert!(config(PlotType::Line, Some("t"), &["a", "b"]).validate_channels().is_ok());
        assert!(config(PlotType::Line, Some("t"), &[]).validate_channels().is_err());
        assert!(config(PlotType::Line, None, &["a"]).validate_channels().is_err());
    }

    #[test]
    fn test_scatter_single_y() {
        assert!(config(PlotType::Scatter, Some("a"), &["b"]).validate_channels().is_ok());
        assert!(config(PlotType::Scatter, Some("a"), &["b", "c"]).validate_channels().is_err());
    }

    #[test]
    fn test_box_follows_flip() {
        let mut boxed = config(PlotType::Box, Some("v"), &[]);
        assert!(boxed.validate_channels().is_err());
        boxed.axes.flip = true;
        assert!(boxed.validate_channels().is_ok());

        let mut count = config(PlotType::Count, None, &["c"]);
        assert!(count.validate_channels().is_err());
        count.axes.flip = true;
        assert!(count.validate_channels().is_ok());
    }

    #[test]
    fn test_histogram_reads_y() {
        assert!(config(PlotType::Histogram, None, &["v"]).validate_channels().is_ok());
        assert!(config(PlotType::Histogram, Some("v"), &[]).validate_channels().is_err());
    }
}
