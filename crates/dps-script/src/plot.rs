//! matplotlib/seaborn code for a plot configuration

use dps_core::plot::{AxisConfig, AxisScale, ErrorBars, GridAxis, GridWhich, Label};
use dps_core::{PlotConfig, PlotType, Result, Subset};

use crate::helpers::Helper;
use crate::operations::filter_mask;
use crate::quote;
use crate::writer::{Import, Script};

/// Emit the figure for `config`, saved to `output`
pub fn emit(script: &mut Script, config: &PlotConfig, subsets: &[Subset], output: &str) -> Result<()> {
    config.validate()?;
    config.validate_channels()?;
    script.import(Import::Matplotlib);
    script.helper(Helper::PlotFrame);

    select_rows(script, config, subsets);
    figure(script, config);
    draw(script, config);
    if config.plot_type == PlotType::Scatter {
        scatter_overlays(script, config);
    }
    axes(script, config);
    grid(script, config);
    labels(script, config);
    annotations(script, config);
    legend(script, config);

    script.line("fig.tight_layout()");
    script.line(format!(
        "fig.savefig({}, dpi={})",
        quote::string(output),
        config.appearance.dpi
    ));
    script.line("plt.close(fig)");
    Ok(())
}

fn select_rows(script: &mut Script, config: &PlotConfig, subsets: &[Subset]) {
    match config.basic.subset.as_deref() {
        Some(name) => match subsets.iter().find(|s| s.name == name) {
            Some(subset) => {
                script.comment(format!("Rows of subset '{}'", name));
                let mask = filter_mask(script, &subset.filters, subset.combine);
                script.line(format!("plot_df = _plain(df[{}].reset_index(drop=True))", mask));
            }
            None => {
                script.comment(format!("Subset '{}' is not defined here; plotting every row", name));
                script.line("plot_df = _plain(df)");
            }
        },
        None => script.line("plot_df = _plain(df)"),
    }
}

fn figure(script: &mut Script, config: &PlotConfig) {
    let appearance = &config.appearance;
    script.line(format!(
        "plt.rcParams[\"font.family\"] = {}",
        quote::string(&appearance.font_family)
    ));
    script.line(format!("plt.rcParams[\"font.size\"] = {}", quote::float(appearance.font_size)));
    script.line(format!("_cmap = plt.get_cmap({})", quote::string(&appearance.palette)));
    script.line(
        "plt.rcParams[\"axes.prop_cycle\"] = plt.cycler(color=getattr(_cmap, \"colors\", [_cmap(i / 9) for i in range(10)]))",
    );
    script.line(format!(
        "fig, ax = plt.subplots(figsize=({}, {}), dpi={})",
        quote::float(appearance.figure_width),
        quote::float(appearance.figure_height),
        appearance.dpi
    ));
}

fn col(name: &str) -> String {
    format!("plot_df[{}]", quote::string(name))
}

/// Names of the x channel and the single y channel
fn xy(config: &PlotConfig) -> (&str, &str) {
    let x = config.basic.x.as_deref().unwrap_or_default();
    let y = config.basic.y.first().map(String::as_str).unwrap_or_default();
    (x, y)
}

/// Value column for single-value plots; histograms always read y
fn value_column(config: &PlotConfig) -> &str {
    let (x, y) = xy(config);
    if config.axes.flip && config.plot_type != PlotType::Histogram {
        x
    } else {
        y
    }
}

fn draw(script: &mut Script, config: &PlotConfig) {
    let appearance = &config.appearance;
    let flip = config.axes.flip;
    let alpha = quote::float(appearance.alpha);
    let width = quote::float(appearance.line_width);
    let hue = config.basic.hue.as_deref();
    let (x, y) = xy(config);

    match config.plot_type {
        PlotType::Line | PlotType::Area => {
            let columns = quote::list(&config.basic.y);
            let call = |frame: &str| {
                let (a, b) = (
                    format!("{}[{}]", frame, quote::string(x)),
                    format!("{}[column]", frame),
                );
                match (config.plot_type, flip) {
                    (PlotType::Line, false) => format!("ax.plot({}, {}", a, b),
                    (PlotType::Line, true) => format!("ax.plot({}, {}", b, a),
                    (_, false) => format!("ax.fill_between({}, {}", a, b),
                    (_, true) => format!("ax.fill_betweenx({}, {}", a, b),
                }
            };
            match hue {
                Some(hue) => {
                    let label = if config.basic.y.len() == 1 {
                        "str(key)"
                    } else {
                        "f\"{column} ({key})\""
                    };
                    script.line(format!("for key, group in plot_df.groupby({}, sort=True):", quote::string(hue)));
                    script.indent();
                    script.line(format!("for column in {}:", columns));
                    script.indent();
                    script.line(format!(
                        "{}, label={}, linewidth={}, alpha={})",
                        call("group"),
                        label,
                        width,
                        alpha
                    ));
                    script.dedent();
                    script.dedent();
                }
                None => {
                    script.line(format!("for column in {}:", columns));
                    script.indent();
                    script.line(format!(
                        "{}, label=column, linewidth={}, alpha={})",
                        call("plot_df"),
                        width,
                        alpha
                    ));
                    script.dedent();
                }
            }
        }
        PlotType::Bar => {
            script.import(Import::Numpy);
            let (bar, size, ticks) = if flip {
                ("barh", "height", "set_yticks")
            } else {
                ("bar", "width", "set_xticks")
            };
            script.line("_positions = np.arange(len(plot_df))");
            script.line(format!("_width = 0.8 / {}", config.basic.y.len()));
            script.line(format!("for i, column in enumerate({}):", quote::list(&config.basic.y)));
            script.indent();
            script.line(format!(
                "ax.{}(_positions - 0.4 + _width * (i + 0.5), plot_df[column], {}=_width, label=column, alpha={})",
                bar, size, alpha
            ));
            script.dedent();
            script.line(format!("ax.{}(_positions, {}.astype(str))", ticks, col(x)));
        }
        PlotType::Scatter => {
            let (a, b) = if flip { (y, x) } else { (x, y) };
            let size = quote::float(appearance.marker_size);
            match hue {
                Some(hue) => {
                    script.line(format!("for key, group in plot_df.groupby({}, sort=True):", quote::string(hue)));
                    script.indent();
                    script.line(format!(
                        "ax.scatter(group[{}], group[{}], s={}, alpha={}, label=str(key))",
                        quote::string(a),
                        quote::string(b),
                        size,
                        alpha
                    ));
                    script.dedent();
                }
                None => script.line(format!(
                    "ax.scatter({}, {}, s={}, alpha={}, label={})",
                    col(a),
                    col(b),
                    size,
                    alpha,
                    quote::string(y)
                )),
            }
        }
        PlotType::Hexbin => {
            let (a, b) = if flip { (y, x) } else { (x, y) };
            script.line(format!("_xy = plot_df[{}].dropna()", quote::list(&[a, b])));
            script.line(format!(
                "_hexbin = ax.hexbin(_xy[{}], _xy[{}], gridsize=30, cmap=\"viridis\", alpha={})",
                quote::string(a),
                quote::string(b),
                alpha
            ));
            script.line("fig.colorbar(_hexbin, ax=ax)");
        }
        PlotType::Pie => {
            script.line(format!("_pie = plot_df[{}].dropna()", quote::list(&[x, y])));
            script.line(format!(
                "ax.pie(_pie[{}], labels=_pie[{}].astype(str), autopct=\"%1.1f%%\")",
                quote::string(y),
                quote::string(x)
            ));
            script.line("ax.axis(\"equal\")");
        }
        PlotType::Histogram => histogram(script, config),
        PlotType::Box | PlotType::Violin => {
            script.import(Import::Seaborn);
            let function = if config.plot_type == PlotType::Box {
                "boxplot"
            } else {
                "violinplot"
            };
            let value = value_column(config);
            let category = if flip { config.basic.y.first().map(String::as_str) } else { config.basic.x.as_deref() };
            let mut args = vec!["data=plot_df".to_string()];
            match (flip, category) {
                (false, Some(category)) => {
                    args.push(format!("x={}", quote::string(category)));
                    args.push(format!("y={}", quote::string(value)));
                }
                (false, None) => args.push(format!("y={}", quote::string(value))),
                (true, Some(category)) => {
                    args.push(format!("x={}", quote::string(value)));
                    args.push(format!("y={}", quote::string(category)));
                    args.push("orient=\"h\"".to_string());
                }
                (true, None) => args.push(format!("x={}", quote::string(value))),
            }
            if let Some(hue) = hue {
                args.push(format!("hue={}", quote::string(hue)));
            }
            args.push("ax=ax".to_string());
            script.line(format!("sns.{}({})", function, args.join(", ")));
        }
        PlotType::Kde => {
            script.import(Import::Seaborn);
            let axis = if flip { "y" } else { "x" };
            let hue = hue.map(|h| format!(", hue={}", quote::string(h))).unwrap_or_default();
            script.line(format!(
                "sns.kdeplot(data=plot_df, {}={}{}, linewidth={}, alpha={}, ax=ax)",
                axis,
                quote::string(value_column(config)),
                hue,
                width,
                alpha
            ));
        }
        PlotType::Count => {
            script.import(Import::Seaborn);
            let (axis, category) = if flip { ("y", y) } else { ("x", x) };
            let hue = hue.map(|h| format!(", hue={}", quote::string(h))).unwrap_or_default();
            script.line(format!(
                "sns.countplot(data=plot_df, {}={}{}, alpha={}, ax=ax)",
                axis,
                quote::string(category),
                hue,
                alpha
            ));
        }
        PlotType::Density2d => {
            script.import(Import::Seaborn);
            let (a, b) = if flip { (y, x) } else { (x, y) };
            let hue = hue.map(|h| format!(", hue={}", quote::string(h))).unwrap_or_default();
            script.line(format!(
                "sns.kdeplot(data=plot_df, x={}, y={}{}, fill=True, alpha={}, ax=ax)",
                quote::string(a),
                quote::string(b),
                hue,
                alpha
            ));
        }
    }
}

fn histogram(script: &mut Script, config: &PlotConfig) {
    script.import(Import::Numpy);
    let analysis = &config.analysis;
    let value = value_column(config);
    let density = analysis.normal_fit || analysis.kde_overlay;
    let orientation = if config.axes.flip { ", orientation=\"horizontal\"" } else { "" };
    let common = format!(
        "bins={}, alpha={}, density={}{}",
        analysis.histogram_bins,
        quote::float(config.appearance.alpha),
        quote::boolean(density),
        orientation
    );

    script.line(format!("_hist = {}.dropna().to_numpy(dtype=\"float64\")", col(value)));
    match config.basic.hue.as_deref() {
        Some(hue) => {
            script.line(format!("for key, group in plot_df.groupby({}, sort=True):", quote::string(hue)));
            script.indent();
            script.line(format!(
                "ax.hist(group[{}].dropna().to_numpy(dtype=\"float64\"), {}, label=str(key))",
                quote::string(value),
                common
            ));
            script.dedent();
        }
        None => script.line(format!("ax.hist(_hist, {}, label={})", common, quote::string(value))),
    }

    if !density {
        return;
    }
    script.import(Import::ScipyStats);
    let width = quote::float(config.appearance.line_width);
    let curve = |values: &str| {
        if config.axes.flip {
            format!("ax.plot({}, _grid", values)
        } else {
            format!("ax.plot(_grid, {}", values)
        }
    };
    script.line("_grid = np.linspace(_hist.min(), _hist.max(), 200)");
    if analysis.normal_fit {
        script.line("_mu, _sigma = stats.norm.fit(_hist)");
        script.line(format!(
            "{}, linewidth={}, label=\"Normal fit\")",
            curve("stats.norm.pdf(_grid, _mu, _sigma)"),
            width
        ));
    }
    if analysis.kde_overlay {
        script.line("_kde = stats.gaussian_kde(_hist)");
        script.line(format!("{}, linewidth={}, label=\"KDE\")", curve("_kde(_grid)"), width));
    }
}

fn scatter_overlays(script: &mut Script, config: &PlotConfig) {
    let analysis = &config.analysis;
    let (x, y) = xy(config);
    let flip = config.axes.flip;
    let width = quote::float(config.appearance.line_width);

    if analysis.needs_fit() {
        script.import(Import::Numpy);
        script.import(Import::ScipyStats);
        script.comment("Linear fit");
        script.line(format!("_fit = plot_df[{}].dropna()", quote::list(&[x, y])));
        script.line(format!("_fit_x = _fit[{}].to_numpy(dtype=\"float64\")", quote::string(x)));
        script.line(format!("_fit_y = _fit[{}].to_numpy(dtype=\"float64\")", quote::string(y)));
        script.line("_reg = stats.linregress(_fit_x, _fit_y)");
        script.line("_grid = np.linspace(_fit_x.min(), _fit_x.max(), 200)");
        script.line("_line = _reg.intercept + _reg.slope * _grid");
        script.line("_residuals = _fit_y - (_reg.intercept + _reg.slope * _fit_x)");

        if analysis.regression {
            let (a, b) = if flip { ("_line", "_grid") } else { ("_grid", "_line") };
            script.line(format!(
                "ax.plot({}, {}, color=\"red\", linewidth={}, label=\"Linear fit\")",
                a, b, width
            ));
        }
        if analysis.confidence_interval {
            let level = analysis.confidence_level;
            script.line("_n = len(_fit_x)");
            script.line("_s = np.sqrt(np.sum(_residuals ** 2) / (_n - 2))");
            script.line(format!("_t = stats.t.ppf((1 + {}) / 2, _n - 2)", quote::float(level)));
            script.line(
                "_band = _t * _s * np.sqrt(1 / _n + (_grid - _fit_x.mean()) ** 2 / np.sum((_fit_x - _fit_x.mean()) ** 2))",
            );
            let fill = if flip { "fill_betweenx" } else { "fill_between" };
            script.line(format!(
                "ax.{}(_grid, _line - _band, _line + _band, color=\"red\", alpha=0.2, label={})",
                fill,
                quote::string(&format!("{}% CI", format_percent(level)))
            ));
        }

        let mut lines = Vec::new();
        if analysis.show_r2 {
            lines.push("f\"R² = {_reg.rvalue ** 2:.4f}\"");
        }
        if analysis.show_rmse {
            lines.push("f\"RMSE = {np.sqrt(np.mean(_residuals ** 2)):.4f}\"");
        }
        if analysis.show_equation {
            lines.push("f\"y = {_reg.slope:.4g}x + {_reg.intercept:.4g}\"");
        }
        if !lines.is_empty() {
            script.line(format!("_stats = [{}]", lines.join(", ")));
            script.line(
                "ax.text(0.05, 0.95, \"\\n\".join(_stats), transform=ax.transAxes, verticalalignment=\"top\", bbox=dict(boxstyle=\"round\", facecolor=\"white\", alpha=0.8))",
            );
        }
    }

    if analysis.error_bars != ErrorBars::None {
        script.comment("Error bars");
        script.line(format!(
            "_err = plot_df.groupby({})[{}].agg([\"mean\", \"std\", \"count\"])",
            quote::string(x),
            quote::string(y)
        ));
        match analysis.error_bars {
            ErrorBars::Stderr => {
                script.import(Import::Numpy);
                script.line("_spread = _err[\"std\"] / np.sqrt(_err[\"count\"])");
            }
            _ => script.line("_spread = _err[\"std\"]"),
        }
        let call = if flip {
            "ax.errorbar(_err[\"mean\"], _err.index, xerr=_spread"
        } else {
            "ax.errorbar(_err.index, _err[\"mean\"], yerr=_spread"
        };
        script.line(format!(
            "{}, fmt=\"none\", ecolor=\"black\", capsize=3, alpha={})",
            call,
            quote::float(config.appearance.alpha)
        ));
    }
}

fn format_percent(level: f64) -> String {
    let percent = level * 100.0;
    if (percent - percent.round()).abs() < 1e-9 {
        format!("{}", percent.round() as i64)
    } else {
        format!("{:.1}", percent)
    }
}

fn axes(script: &mut Script, config: &PlotConfig) {
    axis(script, "x", &config.axes.x);
    axis(script, "y", &config.axes.y);
    let hidden = config.axes.spines.hidden();
    if !hidden.is_empty() {
        script.line(format!("for side in {}:", quote::list(&hidden)));
        script.indent();
        script.line("ax.spines[side].set_visible(False)");
        script.dedent();
    }
}

fn axis(script: &mut Script, name: &str, cfg: &AxisConfig) {
    let (low, high) = if name == "x" { ("left", "right") } else { ("bottom", "top") };
    let mut limits = Vec::new();
    if let Some(min) = cfg.min {
        limits.push(format!("{}={}", low, quote::float(min)));
    }
    if let Some(max) = cfg.max {
        limits.push(format!("{}={}", high, quote::float(max)));
    }
    if !limits.is_empty() {
        script.line(format!("ax.set_{}lim({})", name, limits.join(", ")));
    }
    if cfg.scale != AxisScale::Linear {
        script.line(format!("ax.set_{}scale({})", name, quote::string(cfg.scale.name())));
    }
    if let Some(format) = &cfg.datetime_format {
        script.import(Import::MatplotlibDates);
        if let Some(count) = cfg.tick_count {
            script.line(format!(
                "ax.{}axis.set_major_locator(mdates.AutoDateLocator(maxticks={}))",
                name, count
            ));
        }
        script.line(format!(
            "ax.{}axis.set_major_formatter(mdates.DateFormatter({}))",
            name,
            quote::string(format)
        ));
    } else if let Some(count) = cfg.tick_count {
        script.line(format!("ax.{}axis.set_major_locator(plt.MaxNLocator({}))", name, count));
    }
    if cfg.tick_rotation != 0.0 {
        script.line(format!(
            "ax.tick_params(axis={}, labelrotation={})",
            quote::string(name),
            quote::float(cfg.tick_rotation)
        ));
    }
    if let Some(size) = cfg.tick_font_size {
        script.line(format!(
            "ax.tick_params(axis={}, labelsize={})",
            quote::string(name),
            quote::float(size)
        ));
    }
    if cfg.invert {
        script.line(format!("ax.invert_{}axis()", name));
    }
}

fn grid(script: &mut Script, config: &PlotConfig) {
    let grid = &config.grid;
    if !grid.enabled {
        return;
    }
    let axis = match grid.axis {
        GridAxis::Both => "both",
        GridAxis::X => "x",
        GridAxis::Y => "y",
    };
    let which = match grid.which {
        GridWhich::Major => "major",
        GridWhich::Minor => "minor",
        GridWhich::Both => "both",
    };
    if grid.which != GridWhich::Major {
        script.line("ax.minorticks_on()");
    }
    script.line(format!(
        "ax.grid(True, axis={}, which={}, linestyle={}, alpha={})",
        quote::string(axis),
        quote::string(which),
        quote::string(&grid.line_style),
        quote::float(grid.alpha)
    ));
}

fn labels(script: &mut Script, config: &PlotConfig) {
    let appearance = &config.appearance;
    label(script, "ax.set_title", &appearance.title);
    label(script, "ax.set_xlabel", &appearance.x_label);
    label(script, "ax.set_ylabel", &appearance.y_label);
}

fn label(script: &mut Script, setter: &str, label: &Label) {
    let Some(text) = label.visible_text() else {
        return;
    };
    match label.font_size {
        Some(size) => script.line(format!("{}({}, fontsize={})", setter, quote::string(text), quote::float(size))),
        None => script.line(format!("{}({})", setter, quote::string(text))),
    }
}

fn annotations(script: &mut Script, config: &PlotConfig) {
    for text_box in &config.annotations.text_boxes {
        let bbox = if text_box.boxed {
            ", bbox=dict(boxstyle=\"round\", facecolor=\"white\", alpha=0.8)"
        } else {
            ""
        };
        script.line(format!(
            "ax.text({}, {}, {}, fontsize={}, color={}{})",
            quote::float(text_box.x),
            quote::float(text_box.y),
            quote::string(&text_box.text),
            quote::float(text_box.font_size),
            quote::string(&text_box.color),
            bbox
        ));
    }
    for anchored in &config.annotations.anchored {
        script.import(Import::AnchoredText);
        script.line(format!(
            "ax.add_artist(AnchoredText({}, loc={}, prop=dict(size={})))",
            quote::string(&anchored.text),
            quote::string(&anchored.location),
            quote::float(anchored.font_size)
        ));
    }
}

fn legend(script: &mut Script, config: &PlotConfig) {
    let legend = &config.legend;
    if legend.enabled {
        script.line("if ax.get_legend_handles_labels()[0]:");
        script.indent();
        script.line(format!(
            "ax.legend(loc={}, title={}, frameon={}, ncol={})",
            quote::string(&legend.location),
            quote::optional(legend.title.as_deref()),
            quote::boolean(legend.frame),
            legend.columns.max(1)
        ));
        script.dedent();
    } else {
        script.line("if ax.get_legend() is not None:");
        script.indent();
        script.line("ax.get_legend().remove()");
        script.dedent();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dps_core::plot::{AnchoredText, TextBox};
    use dps_core::{Combine, FilterCondition, FilterSpec, Literal};

    fn scatter() -> PlotConfig {
        let mut config = PlotConfig::new(PlotType::Scatter);
        config.basic.x = Some("x".into());
        config.basic.y = vec!["y".into()];
        config
    }

    fn emit_body(config: &PlotConfig, subsets: &[Subset]) -> (String, Vec<Import>) {
        let mut script = Script::new();
        emit(&mut script, config, subsets, "plot.png").unwrap();
        let imports = script.imports().copied().collect();
        (script.into_body(), imports)
    }

    #[test]
    fn test_basic_scatter() {
        let (body, imports) = emit_body(&scatter(), &[]);
        assert!(body.contains("plot_df = _plain(df)\n"));
        assert!(body.contains("fig, ax = plt.subplots(figsize=(10.0, 6.0), dpi=100)"));
        assert!(body.contains("ax.scatter(plot_df[\"x\"], plot_df[\"y\"], s=36.0, alpha=1.0, label=\"y\")"));
        assert!(body.contains("fig.savefig(\"plot.png\", dpi=100)"));
        assert!(!imports.contains(&Import::ScipyStats));
        assert!(!imports.contains(&Import::MatplotlibDates));
        assert!(imports.contains(&Import::Matplotlib));
    }

    #[test]
    fn test_regression_overlay_imports_stats() {
        let mut config = scatter();
        config.analysis.regression = true;
        config.analysis.confidence_interval = true;
        config.analysis.show_r2 = true;
        let (body, imports) = emit_body(&config, &[]);
        assert!(imports.contains(&Import::ScipyStats));
        assert!(imports.contains(&Import::Numpy));
        assert!(body.contains("_reg = stats.linregress(_fit_x, _fit_y)"));
        assert!(body.contains("label=\"95% CI\""));
        assert!(body.contains("_stats = [f\"R² = {_reg.rvalue ** 2:.4f}\"]"));
    }

    #[test]
    fn test_datetime_axis_imports_formatter() {
        let mut config = PlotConfig::new(PlotType::Line);
        config.basic.x = Some("when".into());
        config.basic.y = vec!["a".into(), "b".into()];
        config.axes.x.datetime_format = Some("%Y-%m".into());
        config.axes.x.tick_rotation = 45.0;
        config.axes.spines.top = false;
        let (body, imports) = emit_body(&config, &[]);
        assert!(imports.contains(&Import::MatplotlibDates));
        assert!(body.contains("ax.xaxis.set_major_formatter(mdates.DateFormatter(\"%Y-%m\"))"));
        assert!(body.contains("ax.tick_params(axis=\"x\", labelrotation=45.0)"));
        assert!(body.contains("for side in [\"top\"]:"));
        assert!(body.contains("for column in [\"a\", \"b\"]:\n    ax.plot(plot_df[\"when\"], plot_df[column], label=column"));
    }

    #[test]
    fn test_histogram_overlays() {
        let mut config = PlotConfig::new(PlotType::Histogram);
        config.basic.y = vec!["v".into()];
        config.analysis.histogram_bins = 12;
        config.analysis.normal_fit = true;
        let (body, imports) = emit_body(&config, &[]);
        assert!(body.contains("ax.hist(_hist, bins=12, alpha=1.0, density=True, label=\"v\")"));
        assert!(body.contains("_mu, _sigma = stats.norm.fit(_hist)"));
        assert!(!body.contains("gaussian_kde"));
        assert!(imports.contains(&Import::ScipyStats));
    }

    #[test]
    fn test_seaborn_only_for_statistical_plots() {
        let mut config = PlotConfig::new(PlotType::Box);
        config.basic.x = Some("group".into());
        config.basic.y = vec!["v".into()];
        let (body, imports) = emit_body(&config, &[]);
        assert!(imports.contains(&Import::Seaborn));
        assert!(body.contains("sns.boxplot(data=plot_df, x=\"group\", y=\"v\", ax=ax)"));

        let (_, imports) = emit_body(&scatter(), &[]);
        assert!(!imports.contains(&Import::Seaborn));
    }

    #[test]
    fn test_subset_rows_and_annotations() {
        let mut config = scatter();
        config.basic.subset = Some("hi".into());
        config.annotations.text_boxes.push(TextBox {
            text: "peak \"here\"".into(),
            x: 1.0,
            y: 2.0,
            ..TextBox::default()
        });
        config.annotations.anchored.push(AnchoredText {
            text: "n=3".into(),
            ..AnchoredText::default()
        });
        let subset = Subset::new("hi", "", vec![FilterSpec::new("x", FilterCondition::Gt, Literal::Int(1))], Combine::All);
        let (body, imports) = emit_body(&config, &[subset]);
        assert!(body.contains("plot_df = _plain(df[_filter_mask(df, \"x\", \">\", 1)].reset_index(drop=True))"));
        assert!(body.contains("ax.text(1.0, 2.0, \"peak \\\"here\\\"\", fontsize=10.0, color=\"black\", bbox="));
        assert!(body.contains("ax.add_artist(AnchoredText(\"n=3\", loc=\"upper left\", prop=dict(size=10.0)))"));
        assert!(imports.contains(&Import::AnchoredText));
    }

    #[test]
    fn test_missing_subset_plots_everything() {
        let mut config = scatter();
        config.basic.subset = Some("gone".into());
        let (body, _) = emit_body(&config, &[]);
        assert!(body.contains("# Subset 'gone' is not defined here; plotting every row"));
        assert!(body.contains("plot_df = _plain(df)\n"));
    }

    #[test]
    fn test_missing_channels_rejected() {
        let mut script = Script::new();
        let config = PlotConfig::new(PlotType::Scatter);
        assert!(emit(&mut script, &config, &[], "plot.png").is_err());
    }

    #[test]
    fn test_legend_and_grid() {
        let mut config = scatter();
        config.grid.enabled = true;
        config.grid.which = GridWhich::Both;
        config.legend.enabled = false;
        let (body, _) = emit_body(&config, &[]);
        assert!(body.contains("ax.minorticks_on()\nax.grid(True, axis=\"both\", which=\"both\", linestyle=\"--\", alpha=0.3)"));
        assert!(body.contains("ax.get_legend().remove()"));
    }
}
