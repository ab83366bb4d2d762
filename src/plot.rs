//! SVG plots of time-series run data.
//!
//! Reads selected columns back out of a run's `results.csv` and renders
//! them as polylines against the step axis. The output is plain SVG text,
//! appended to the run directory as `plot_<columns>.svg`.

use crate::error::{GatewayError, GatewayResult};

const WIDTH: f64 = 800.0;
const HEIGHT: f64 = 480.0;
const MARGIN_LEFT: f64 = 70.0;
const MARGIN_RIGHT: f64 = 30.0;
const MARGIN_TOP: f64 = 40.0;
const MARGIN_BOTTOM: f64 = 50.0;

const PALETTE: [&str; 6] = [
    "#1f77b4", "#d62728", "#2ca02c", "#9467bd", "#ff7f0e", "#17becf",
];

/// A rendered plot.
#[derive(Debug, Clone)]
pub struct SeriesPlot {
    /// The SVG document.
    pub svg: String,
    /// Total data points plotted across all series.
    pub points: usize,
}

/// Builds the artifact file name for a plot of the given columns,
/// reduced to filesystem-safe characters.
#[must_use]
pub fn plot_file_name(columns: &[String]) -> String {
    let joined = columns.join("_");
    let safe: String = joined
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .collect();
    format!("plot_{safe}.svg")
}

/// Renders the requested columns of a `results.csv` document.
///
/// The x axis is the `step` column. Rows whose value is not finite (for
/// example non-converged steps) are skipped per series.
pub fn render_series_plot(csv_text: &str, columns: &[String]) -> GatewayResult<SeriesPlot> {
    let mut reader = csv::Reader::from_reader(csv_text.as_bytes());
    let headers = reader
        .headers()
        .map_err(|e| parse_error(e.to_string()))?
        .clone();

    let column_index = |name: &str| -> GatewayResult<usize> {
        headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| GatewayError::UnknownElement {
                target: name.to_string(),
            })
    };

    let step_index = column_index("step")?;
    let mut indices = Vec::with_capacity(columns.len());
    for column in columns {
        indices.push(column_index(column)?);
    }

    // series[k] holds (step, value) points for columns[k].
    let mut series: Vec<Vec<(f64, f64)>> = vec![Vec::new(); columns.len()];
    for record in reader.records() {
        let record = record.map_err(|e| parse_error(e.to_string()))?;
        let step: f64 = field(&record, step_index)?;
        for (k, &index) in indices.iter().enumerate() {
            let value: f64 = field(&record, index)?;
            if value.is_finite() {
                series[k].push((step, value));
            }
        }
    }

    let points: usize = series.iter().map(Vec::len).sum();
    if points == 0 {
        return Err(GatewayError::InvalidValue {
            target: "results.csv".to_string(),
            field: columns.join(","),
            reason: "no finite data points to plot".to_string(),
        });
    }

    Ok(SeriesPlot {
        svg: render_svg(columns, &series),
        points,
    })
}

fn parse_error(detail: String) -> GatewayError {
    GatewayError::Parse {
        path: "results.csv".to_string(),
        detail,
    }
}

fn field(record: &csv::StringRecord, index: usize) -> GatewayResult<f64> {
    let raw = record
        .get(index)
        .ok_or_else(|| parse_error(format!("missing field {index}")))?;
    raw.parse()
        .map_err(|_| parse_error(format!("'{raw}' is not a number")))
}

fn render_svg(columns: &[String], series: &[Vec<(f64, f64)>]) -> String {
    let all_points = series.iter().flatten();
    let (mut x_min, mut x_max) = (f64::INFINITY, f64::NEG_INFINITY);
    let (mut y_min, mut y_max) = (f64::INFINITY, f64::NEG_INFINITY);
    for &(x, y) in all_points {
        x_min = x_min.min(x);
        x_max = x_max.max(x);
        y_min = y_min.min(y);
        y_max = y_max.max(y);
    }
    if x_max == x_min {
        x_max = x_min + 1.0;
    }
    if y_max == y_min {
        y_max = y_min + 1.0;
    }
    // A little headroom keeps lines off the frame.
    let pad = (y_max - y_min) * 0.05;
    y_min -= pad;
    y_max += pad;

    let plot_width = WIDTH - MARGIN_LEFT - MARGIN_RIGHT;
    let plot_height = HEIGHT - MARGIN_TOP - MARGIN_BOTTOM;
    let sx = |x: f64| MARGIN_LEFT + (x - x_min) / (x_max - x_min) * plot_width;
    let sy = |y: f64| MARGIN_TOP + (y_max - y) / (y_max - y_min) * plot_height;

    let mut svg = String::new();
    svg.push_str(&format!(
        "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{WIDTH}\" height=\"{HEIGHT}\" \
         viewBox=\"0 0 {WIDTH} {HEIGHT}\">\n"
    ));
    svg.push_str("<rect width=\"100%\" height=\"100%\" fill=\"white\"/>\n");

    // Frame and axis labels.
    svg.push_str(&format!(
        "<rect x=\"{MARGIN_LEFT}\" y=\"{MARGIN_TOP}\" width=\"{plot_width}\" \
         height=\"{plot_height}\" fill=\"none\" stroke=\"#444\"/>\n"
    ));
    svg.push_str(&format!(
        "<text x=\"{}\" y=\"{}\" font-size=\"13\" text-anchor=\"middle\">step</text>\n",
        MARGIN_LEFT + plot_width / 2.0,
        HEIGHT - 12.0
    ));
    svg.push_str(&format!(
        "<text x=\"12\" y=\"{}\" font-size=\"11\" text-anchor=\"start\">{y_max:.3}</text>\n",
        MARGIN_TOP + 4.0
    ));
    svg.push_str(&format!(
        "<text x=\"12\" y=\"{}\" font-size=\"11\" text-anchor=\"start\">{y_min:.3}</text>\n",
        MARGIN_TOP + plot_height
    ));

    for (k, points) in series.iter().enumerate() {
        if points.is_empty() {
            continue;
        }
        let color = PALETTE[k % PALETTE.len()];
        let path: Vec<String> = points
            .iter()
            .map(|&(x, y)| format!("{:.2},{:.2}", sx(x), sy(y)))
            .collect();
        svg.push_str(&format!(
            "<polyline points=\"{}\" fill=\"none\" stroke=\"{color}\" stroke-width=\"1.5\"/>\n",
            path.join(" ")
        ));
        // Legend entry.
        let ly = MARGIN_TOP + 16.0 * k as f64 + 4.0;
        svg.push_str(&format!(
            "<rect x=\"{}\" y=\"{}\" width=\"10\" height=\"10\" fill=\"{color}\"/>\n",
            MARGIN_LEFT + 8.0,
            ly
        ));
        svg.push_str(&format!(
            "<text x=\"{}\" y=\"{}\" font-size=\"12\">{}</text>\n",
            MARGIN_LEFT + 22.0,
            ly + 9.0,
            columns[k]
        ));
    }

    svg.push_str("</svg>\n");
    svg
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    const CSV: &str = "\
step,hour,scale,converged,iterations,slack_p_mw,slack_q_mvar,min_voltage_pu,max_voltage_pu
0,0.0,0.7,true,32,5.1,1.6,0.96,1.0
1,1.0,1.0,true,38,7.5,2.4,0.94,1.0
2,2.0,1.2,true,41,9.1,3.0,0.93,1.0
";

    #[test]
    fn renders_polylines_for_selected_columns() {
        let columns = vec!["slack_p_mw".to_string(), "min_voltage_pu".to_string()];
        let plot = render_series_plot(CSV, &columns).unwrap();
        assert_eq!(plot.points, 6);
        assert!(plot.svg.starts_with("<svg"));
        assert_eq!(plot.svg.matches("<polyline").count(), 2);
        assert!(plot.svg.contains("slack_p_mw"));
    }

    #[test]
    fn unknown_column_is_reported() {
        let columns = vec!["frequency_hz".to_string()];
        let err = render_series_plot(CSV, &columns).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownElement);
    }

    #[test]
    fn non_finite_rows_are_skipped() {
        let csv = "\
step,slack_p_mw
0,5.0
1,NaN
2,6.0
";
        let columns = vec!["slack_p_mw".to_string()];
        let plot = render_series_plot(csv, &columns).unwrap();
        assert_eq!(plot.points, 2);
    }

    #[test]
    fn all_nan_series_is_an_error() {
        let csv = "step,slack_p_mw\n0,NaN\n";
        let columns = vec!["slack_p_mw".to_string()];
        let err = render_series_plot(csv, &columns).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidValue);
    }

    #[test]
    fn file_names_are_sanitized() {
        let columns = vec!["slack_p_mw".to_string(), "min/voltage".to_string()];
        assert_eq!(plot_file_name(&columns), "plot_slack_p_mw_minvoltage.svg");
    }
}
