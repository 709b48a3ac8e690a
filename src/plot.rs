//! PNG summaries of a sigma-DCA calculation.
use std::path::Path;

use plotters::prelude::*;
use tracing::info;

use crate::config::SigmaDcaConfig;
use crate::error::QaError;
use crate::fit::WidthCurve;
use crate::hist::Hist2D;
use crate::sigma_dca::{SigmaDcaResult, WidthFit};

type DrawResult<T> = Result<T, Box<dyn std::error::Error>>;

const CURVE_STEPS: usize = 200;

fn plot_error(name: &str) -> impl FnOnce(Box<dyn std::error::Error>) -> QaError + '_ {
    move |err| QaError::Plot {
        name: name.to_string(),
        reason: err.to_string(),
    }
}

fn curve_points(curve: &WidthCurve, x_range: (f64, f64)) -> Vec<(f64, f64)> {
    let (low, high) = (x_range.0.max(curve.range.0), x_range.1.min(curve.range.1));
    (0..=CURVE_STEPS)
        .map(|i| low + (high - low) * i as f64 / CURVE_STEPS as f64)
        .map(|x| (x, curve.eval(x)))
        .collect()
}

fn draw_width(path: &Path, fit: &WidthFit, config: &SigmaDcaConfig) -> DrawResult<()> {
    let root = BitMapBackend::new(path, (950, 950)).into_drawing_area();
    root.fill(&WHITE)?;
    let (x_min, x_max) = config.pt_plot_range;
    let (y_min, y_max) = config.width_plot_range;
    let mut chart = ChartBuilder::on(&root)
        .caption(fit.widths.name(), ("sans-serif", 24))
        .margin(15)
        .x_label_area_size(50)
        .y_label_area_size(70)
        .build_cartesian_2d(x_min..x_max, (y_min..y_max).log_scale())?;
    chart
        .configure_mesh()
        .x_desc("p_T [GeV/c]")
        .y_desc("width [cm]")
        .draw()?;

    let axis = *fit.widths.axis();
    let points: Vec<(f64, f64, f64)> = axis
        .bins()
        .map(|i| (axis.bin_center(i), fit.widths.bin_content(i), fit.widths.bin_error(i)))
        .filter(|&(x, y, _)| y > 0.0 && x >= x_min && x <= x_max)
        .collect();
    for &(x, y, err) in &points {
        chart.draw_series(std::iter::once(PathElement::new(
            vec![(x, (y - err).max(y_min)), (x, y + err)],
            BLACK.mix(0.6),
        )))?;
    }
    chart.draw_series(
        points
            .iter()
            .map(|&(x, y, _)| Circle::new((x, y), 3, BLACK.filled())),
    )?;
    chart
        .draw_series(LineSeries::new(
            curve_points(&fit.curve, config.pt_plot_range),
            &RED,
        ))?
        .label(fit.curve.name.as_str())
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], RED));
    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()?;
    root.present()?;
    Ok(())
}

fn draw_dca(
    path: &Path,
    hist: &Hist2D,
    x_range: (f64, f64),
    bounds: &[&WidthFit],
    config: &SigmaDcaConfig,
) -> DrawResult<()> {
    //! Draws the filled cells of `hist` shaded by content, overlaid with the `±n_cut`
    //! curves in `bounds`.
    let root = BitMapBackend::new(path, (950, 950)).into_drawing_area();
    root.fill(&WHITE)?;
    let (y_min, y_max) = config.dca_plot_range;
    let mut chart = ChartBuilder::on(&root)
        .caption(hist.name(), ("sans-serif", 24))
        .margin(15)
        .x_label_area_size(50)
        .y_label_area_size(70)
        .build_cartesian_2d(x_range.0..x_range.1, y_min..y_max)?;
    chart.configure_mesh().disable_mesh().draw()?;

    let (x_axis, y_axis) = (*hist.x_axis(), *hist.y_axis());
    let log_max = hist.maximum().max(1.0).ln_1p();
    chart.draw_series(
        hist.iter_bins()
            .filter(|&(ix, iy, content, _)| {
                content > 0.0
                    && (1..=x_axis.n_bins).contains(&ix)
                    && (1..=y_axis.n_bins).contains(&iy)
            })
            .map(|(ix, iy, content, _)| {
                let shade = (content.ln_1p() / log_max).min(1.0);
                Rectangle::new(
                    [
                        (x_axis.bin_low_edge(ix), y_axis.bin_low_edge(iy)),
                        (x_axis.bin_up_edge(ix), y_axis.bin_up_edge(iy)),
                    ],
                    HSLColor(0.7 * (1.0 - shade), 0.9, 0.5).filled(),
                )
            }),
    )?;
    for fit in bounds {
        for curve in [&fit.neg, &fit.pos] {
            chart.draw_series(LineSeries::new(curve_points(curve, x_range), &RED))?;
        }
    }
    root.present()?;
    Ok(())
}

pub fn draw_sigma_dca(
    result: &SigmaDcaResult,
    config: &SigmaDcaConfig,
    dir: &Path,
) -> Result<(), QaError> {
    //! Writes `cWidthDcaXY.png`, `cWidthDcaZ.png`, `cDcaXYvsPt.png`, `cDcaZvsPt.png` and
    //! `cDcaXYvsZ.png` into `dir`.
    std::fs::create_dir_all(dir)?;
    for (name, fit) in [("cWidthDcaXY", &result.xy), ("cWidthDcaZ", &result.z)] {
        draw_width(&dir.join(format!("{name}.png")), fit, config).map_err(plot_error(name))?;
    }
    let pt = config.pt_plot_range;
    let dca = config.dca_plot_range;
    let panels: [(&str, &Hist2D, (f64, f64), Vec<&WidthFit>); 3] = [
        ("cDcaXYvsPt", &result.all.xy_vs_pt, pt, vec![&result.xy]),
        ("cDcaZvsPt", &result.all.z_vs_pt, pt, vec![&result.z]),
        ("cDcaXYvsZ", &result.all.xy_vs_z, dca, Vec::new()),
    ];
    for (name, hist, x_range, bounds) in panels {
        draw_dca(&dir.join(format!("{name}.png")), hist, x_range, &bounds, config)
            .map_err(plot_error(name))?;
    }
    info!("saved plots to {}", dir.display());
    Ok(())
}
