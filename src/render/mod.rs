//! Static SVG charts for separators, frontiers and allocations.
//!
//! Charts are returned as strings, so they can be inspected in tests and written anywhere
//! by the caller.

use std::fmt::Write as _;
use std::fs;
use std::path::Path;
use thiserror::Error;
use crate::sample::{self, LabeledPoints, Label};
use crate::fit::{Separator, Frontier, Portfolio, Allocation};

#[derive(Debug, Error)]
pub enum RenderError {

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("No data to plot")]
    NoData

}

pub type RenderResult<T> = Result<T, RenderError>;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {

    pub r : u8,

    pub g : u8,

    pub b : u8

}

impl Color {

    pub const fn new(r : u8, g : u8, b : u8) -> Self {
        Self { r, g, b }
    }

    pub fn to_css(&self) -> String {
        format!("rgb({},{},{})", self.r, self.g, self.b)
    }

    /// Linear interpolation between self (t = 0) and other (t = 1).
    pub fn mix(&self, other : &Color, t : f64) -> Color {
        let t = t.max(0.).min(1.);
        let lerp = |a : u8, b : u8| (a as f64 + (b as f64 - a as f64) * t).round() as u8;
        Color::new(lerp(self.r, other.r), lerp(self.g, other.g), lerp(self.b, other.b))
    }

    pub const RED : Color = Color::new(214, 39, 40);

    pub const BLUE : Color = Color::new(31, 119, 180);

    pub const GREEN : Color = Color::new(44, 160, 44);

    pub const GRAY : Color = Color::new(128, 128, 128);

}

/// Slice colors of allocation charts.
pub const PALETTE : [Color; 8] = [
    Color::new(31, 119, 180),
    Color::new(255, 127, 14),
    Color::new(44, 160, 44),
    Color::new(214, 39, 40),
    Color::new(148, 103, 189),
    Color::new(140, 86, 75),
    Color::new(227, 119, 194),
    Color::new(127, 127, 127)
];

const VIRIDIS : [Color; 5] = [
    Color::new(68, 1, 84),
    Color::new(59, 82, 139),
    Color::new(33, 145, 140),
    Color::new(94, 201, 98),
    Color::new(253, 231, 37)
];

/// Viridis-like color ramp over t in [0, 1].
pub fn ramp(t : f64) -> Color {
    let t = if t.is_finite() { t.max(0.).min(1.) } else { 0. };
    let pos = t * (VIRIDIS.len() - 1) as f64;
    let ix = (pos.floor() as usize).min(VIRIDIS.len() - 2);
    VIRIDIS[ix].mix(&VIRIDIS[ix + 1], pos - ix as f64)
}

/// Escapes text content for SVG.
pub fn escape(s : &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn fmt_tick(v : f64, span : f64) -> String {
    if span >= 100. {
        format!("{:.0}", v)
    } else if span >= 1. {
        format!("{:.2}", v)
    } else {
        format!("{:.4}", v)
    }
}

/// Maps data coordinates into the plotting area of a chart.
#[derive(Debug, Clone, Copy)]
pub struct Frame {

    pub width : f64,

    pub height : f64,

    pub left : f64,

    pub right : f64,

    pub top : f64,

    pub bottom : f64,

    pub x_range : (f64, f64),

    pub y_range : (f64, f64)

}

impl Frame {

    /// Frame over the informed data ranges, padded by 5% at each side.
    pub fn new(x_range : (f64, f64), y_range : (f64, f64)) -> Self {
        Self {
            width : 800.,
            height : 600.,
            left : 80.,
            right : 40.,
            top : 50.,
            bottom : 60.,
            x_range : pad(x_range),
            y_range : pad(y_range)
        }
    }

    pub fn plot_width(&self) -> f64 {
        self.width - self.left - self.right
    }

    pub fn plot_height(&self) -> f64 {
        self.height - self.top - self.bottom
    }

    pub fn px(&self, x : f64, y : f64) -> (f64, f64) {
        let (x0, x1) = self.x_range;
        let (y0, y1) = self.y_range;
        let px = self.left + (x - x0) / (x1 - x0) * self.plot_width();
        let py = self.top + (1. - (y - y0) / (y1 - y0)) * self.plot_height();
        (px, py)
    }

}

fn pad(range : (f64, f64)) -> (f64, f64) {
    let (lo, hi) = range;
    let span = hi - lo;
    if span > 0. {
        (lo - 0.05 * span, hi + 0.05 * span)
    } else {
        let d = if lo.abs() > 0. { 0.1 * lo.abs() } else { 1. };
        (lo - d, hi + d)
    }
}

/// Accumulates SVG elements over a frame, adding the header, axes, labels
/// and legend at finish(.).
pub struct Chart {

    frame : Frame,

    title : String,

    x_label : String,

    y_label : String,

    body : String,

    legend : Vec<(String, Color)>

}

impl Chart {

    pub fn new(frame : Frame, title : &str, x_label : &str, y_label : &str) -> Self {
        Self {
            frame,
            title : title.to_string(),
            x_label : x_label.to_string(),
            y_label : y_label.to_string(),
            body : String::new(),
            legend : Vec::new()
        }
    }

    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    pub fn add_legend(&mut self, label : &str, color : Color) {
        self.legend.push((label.to_string(), color));
    }

    /// "x" markers at each point.
    pub fn crosses(&mut self, pts : impl Iterator<Item=(f64, f64)>, color : Color) {
        let mut d = String::new();
        for (x, y) in pts {
            let (px, py) = self.frame.px(x, y);
            let _ = write!(
                d,
                "M{:.1} {:.1}L{:.1} {:.1}M{:.1} {:.1}L{:.1} {:.1}",
                px - 3., py - 3., px + 3., py + 3., px - 3., py + 3., px + 3., py - 3.
            );
        }
        if !d.is_empty() {
            let _ = writeln!(
                self.body,
                r#"<path d="{}" stroke="{}" stroke-width="1.5" fill="none" clip-path="url(#plot)"/>"#,
                d, color.to_css()
            );
        }
    }

    pub fn dot(&mut self, x : f64, y : f64, radius : f64, color : Color, opacity : f64) {
        let (px, py) = self.frame.px(x, y);
        let _ = writeln!(
            self.body,
            r#"<circle cx="{:.1}" cy="{:.1}" r="{}" fill="{}" fill-opacity="{}" clip-path="url(#plot)"/>"#,
            px, py, radius, color.to_css(), opacity
        );
    }

    pub fn polyline(&mut self, pts : &[(f64, f64)], color : Color, width : f64) {
        let coords : Vec<String> = pts.iter()
            .map(|(x, y)| {
                let (px, py) = self.frame.px(*x, *y);
                format!("{:.1},{:.1}", px, py)
            })
            .collect();
        let _ = writeln!(
            self.body,
            r#"<polyline points="{}" stroke="{}" stroke-width="{}" fill="none" clip-path="url(#plot)"/>"#,
            coords.join(" "), color.to_css(), width
        );
    }

    pub fn polygon(&mut self, pts : &[(f64, f64)], color : Color, opacity : f64) {
        let coords : Vec<String> = pts.iter()
            .map(|(x, y)| {
                let (px, py) = self.frame.px(*x, *y);
                format!("{:.1},{:.1}", px, py)
            })
            .collect();
        let _ = writeln!(
            self.body,
            r#"<polygon points="{}" fill="{}" fill-opacity="{}" stroke="none" clip-path="url(#plot)"/>"#,
            coords.join(" "), color.to_css(), opacity
        );
    }

    fn axes(&self) -> String {
        let f = &self.frame;
        let mut svg = String::new();
        let (x0, x1) = f.x_range;
        let (y0, y1) = f.y_range;
        for i in 0..=5 {
            let t = i as f64 / 5.;
            let xv = x0 + t * (x1 - x0);
            let (px, _) = f.px(xv, y0);
            let _ = writeln!(
                svg,
                r#"<line x1="{:.1}" y1="{}" x2="{:.1}" y2="{}" class="grid"/><text x="{:.1}" y="{}" class="axis" text-anchor="middle">{}</text>"#,
                px, f.top, px, f.top + f.plot_height(), px, f.top + f.plot_height() + 15., fmt_tick(xv, x1 - x0)
            );
            let yv = y0 + t * (y1 - y0);
            let (_, py) = f.px(x0, yv);
            let _ = writeln!(
                svg,
                r#"<line x1="{}" y1="{:.1}" x2="{}" y2="{:.1}" class="grid"/><text x="{}" y="{:.1}" class="axis" text-anchor="end">{}</text>"#,
                f.left, py, f.left + f.plot_width(), py, f.left - 5., py + 3., fmt_tick(yv, y1 - y0)
            );
        }
        let _ = writeln!(
            svg,
            r#"<rect x="{}" y="{}" width="{}" height="{}" fill="none" stroke="black"/>"#,
            f.left, f.top, f.plot_width(), f.plot_height()
        );
        let _ = writeln!(
            svg,
            r#"<text x="{}" y="{}" class="label" text-anchor="middle">{}</text>"#,
            f.left + f.plot_width() / 2., f.height - 15., escape(&self.x_label)
        );
        let _ = writeln!(
            svg,
            r#"<text x="20" y="{0}" class="label" text-anchor="middle" transform="rotate(-90,20,{0})">{1}</text>"#,
            f.top + f.plot_height() / 2., escape(&self.y_label)
        );
        svg
    }

    fn legend(&self) -> String {
        let f = &self.frame;
        let mut svg = String::new();
        let x = f.left + f.plot_width() - 170.;
        for (i, (label, color)) in self.legend.iter().enumerate() {
            let y = f.top + 15. + 18. * i as f64;
            let _ = writeln!(
                svg,
                r#"<rect x="{}" y="{}" width="12" height="12" fill="{}"/><text x="{}" y="{}" class="legend">{}</text>"#,
                x, y - 10., color.to_css(), x + 18., y, escape(label)
            );
        }
        svg
    }

    pub fn finish(self) -> String {
        let f = &self.frame;
        let mut svg = header(f.width, f.height);
        let _ = writeln!(
            svg,
            r#"<defs><clipPath id="plot"><rect x="{}" y="{}" width="{}" height="{}"/></clipPath></defs>"#,
            f.left, f.top, f.plot_width(), f.plot_height()
        );
        svg.push_str(&self.axes());
        svg.push_str(&self.body);
        svg.push_str(&self.legend());
        let _ = writeln!(
            svg,
            r#"<text x="{}" y="25" class="title" text-anchor="middle">{}</text>"#,
            f.width / 2., escape(&self.title)
        );
        svg.push_str("</svg>\n");
        svg
    }

}

fn header(width : f64, height : f64) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<svg xmlns="http://www.w3.org/2000/svg" width="{0}" height="{1}" viewBox="0 0 {0} {1}">
<style>
    .title {{ font: bold 16px sans-serif; }}
    .label {{ font: 12px sans-serif; }}
    .axis {{ font: 10px sans-serif; }}
    .grid {{ stroke: #e0e0e0; stroke-width: 1; }}
    .legend {{ font: 11px sans-serif; }}
</style>
<rect width="100%" height="100%" fill="white"/>
"#,
        width, height
    )
}

/// Scatter of both groups with the separating line and its margin band. Points are
/// colored by the side of the computed line they fall on. Without a separator, all
/// points are drawn in gray under a failure title.
pub fn separator_chart(pts : &LabeledPoints, sep : Option<&Separator>) -> RenderResult<String> {
    let (x_range, y_range) = match (pts.x_range(), pts.y_range()) {
        (Some(x), Some(y)) => (x, y),
        _ => return Err(RenderError::NoData)
    };
    let frame = Frame::new(x_range, y_range);
    let title = match sep {
        Some(s) => format!("Separated (margin = {:.2})", s.margin),
        None => String::from("No separating line found")
    };
    let mut chart = Chart::new(frame, &title, "x", "y");
    match sep {
        Some(s) => {
            let (x0, x1) = chart.frame().x_range;
            let mut band : Vec<(f64, f64)> = Vec::with_capacity(4);
            band.push((x0, s.band(x0).0));
            band.push((x1, s.band(x1).0));
            band.push((x1, s.band(x1).1));
            band.push((x0, s.band(x0).1));
            chart.polygon(&band[..], Color::GREEN, 0.1);
            let above = pts.iter().filter(|(p, _)| s.side(p) == Some(Label::Top) ).map(|(p, _)| (p.x, p.y) );
            chart.crosses(above, Color::RED);
            let below = pts.iter().filter(|(p, _)| s.side(p) != Some(Label::Top) ).map(|(p, _)| (p.x, p.y) );
            chart.crosses(below, Color::BLUE);
            chart.polyline(&[(x0, s.predict(x0)), (x1, s.predict(x1))], Color::GREEN, 3.);
            chart.add_legend("Above line", Color::RED);
            chart.add_legend("Below line", Color::BLUE);
            chart.add_legend("Separating line", Color::GREEN);
            chart.add_legend("Margin", Color::new(213, 236, 213));
        },
        None => {
            chart.crosses(pts.iter().map(|(p, _)| (p.x, p.y) ), Color::GRAY);
        }
    }
    Ok(chart.finish())
}

/// Random portfolios colored by their return/risk ratio, overlaid by the efficient frontier.
pub fn frontier_chart(frontier : &Frontier, random : &[Portfolio]) -> RenderResult<String> {
    let all = || frontier.portfolios.iter().chain(random.iter());
    let x_range = sample::extent(all().map(|p| p.risk ));
    let y_range = sample::extent(all().map(|p| p.expected_return ));
    let (x_range, y_range) = match (x_range, y_range) {
        (Some(x), Some(y)) => (x, y),
        _ => return Err(RenderError::NoData)
    };
    let mut chart = Chart::new(
        Frame::new(x_range, y_range),
        "Risk vs return (efficient frontier)",
        "Risk (objective value)",
        "Expected return"
    );
    let ratios : Vec<f64> = random.iter()
        .map(|p| if p.risk > 0. { p.expected_return / p.risk } else { 0. } )
        .collect();
    let (r_lo, r_hi) = sample::extent(ratios.iter().cloned()).unwrap_or((0., 1.));
    for (p, r) in random.iter().zip(ratios.iter()) {
        let t = if r_hi > r_lo { (r - r_lo) / (r_hi - r_lo) } else { 0.5 };
        chart.dot(p.risk, p.expected_return, 2., ramp(t), 0.3);
    }
    let line : Vec<(f64, f64)> = frontier.portfolios.iter()
        .map(|p| (p.risk, p.expected_return) )
        .collect();
    chart.polyline(&line[..], Color::RED, 3.);
    if !random.is_empty() {
        chart.add_legend("Random portfolios", ramp(0.5));
    }
    chart.add_legend("Efficient frontier", Color::RED);
    Ok(chart.finish())
}

/// Pie chart with one slice per asset, labeled by its share of the total weight.
pub fn allocation_chart(alloc : &Allocation) -> RenderResult<String> {
    if alloc.weights.is_empty() {
        return Err(RenderError::NoData);
    }
    let (width, height) = (800., 800.);
    let (cx, cy, r) = (400., 420., 280.);
    let mut svg = header(width, height);
    let shares = alloc.shares();
    let mut start = 0.0f64;
    for (i, (label, share)) in alloc.labels.iter().zip(shares.iter()).enumerate() {
        let color = PALETTE[i % PALETTE.len()];
        let sweep = share / 100. * 2. * std::f64::consts::PI;
        let end = start + sweep;
        // Counter-clockwise from the positive x axis (y grows downwards).
        let at = |angle : f64, radius : f64| (cx + radius * angle.cos(), cy - radius * angle.sin());
        if *share >= 100. - 1E-9 {
            let _ = writeln!(svg, r#"<circle cx="{}" cy="{}" r="{}" fill="{}"/>"#, cx, cy, r, color.to_css());
        } else if sweep > 0. {
            let (x0, y0) = at(start, r);
            let (x1, y1) = at(end, r);
            let large = if sweep > std::f64::consts::PI { 1 } else { 0 };
            let _ = writeln!(
                svg,
                r#"<path d="M{} {}L{:.2} {:.2}A{} {} 0 {} 0 {:.2} {:.2}Z" fill="{}" stroke="white"/>"#,
                cx, cy, x0, y0, r, r, large, x1, y1, color.to_css()
            );
        }
        let mid = start + sweep / 2.;
        let (lx, ly) = at(mid, 1.1 * r);
        let anchor = if mid.cos() >= 0. { "start" } else { "end" };
        let _ = writeln!(
            svg,
            r#"<text x="{:.1}" y="{:.1}" class="label" text-anchor="{}">{} {:.2}%</text>"#,
            lx, ly, anchor, escape(label), share
        );
        start = end;
    }
    let title = match alloc.risk {
        Some(risk) => format!("Risk {}", risk),
        None => String::from("Allocation")
    };
    let _ = writeln!(svg, r#"<text x="{}" y="40" class="title" text-anchor="middle">{}</text>"#, width / 2., escape(&title));
    svg.push_str("</svg>\n");
    Ok(svg)
}

pub fn write_svg(path : impl AsRef<Path>, svg : &str) -> RenderResult<()> {
    fs::write(path, svg)?;
    Ok(())
}

#[cfg(test)]
mod tests {

    use super::*;
    use nalgebra::DVector;

    fn points() -> LabeledPoints {
        LabeledPoints::from_pairs(&[(0., 0.), (1., 0.)], &[(0., 10.), (1., 10.)])
    }

    #[test]
    fn separator_chart_elements() {
        let sep = Separator { intercept : 5., slope : 0., margin : 5. };
        let svg = separator_chart(&points(), Some(&sep)).unwrap();
        assert!(svg.starts_with("<?xml"));
        assert!(svg.trim_end().ends_with("</svg>"));
        assert!(svg.contains("Separated (margin = 5.00)"));
        assert!(svg.contains("<polygon"));
        assert!(svg.contains(&Color::RED.to_css()));
        assert!(svg.contains(&Color::BLUE.to_css()));
        let fallback = separator_chart(&points(), None).unwrap();
        assert!(fallback.contains("No separating line found"));
        assert!(!fallback.contains("<polygon"));
        assert!(matches!(separator_chart(&LabeledPoints::default(), None), Err(RenderError::NoData)));
    }

    #[test]
    fn frontier_chart_elements() {
        let port = |risk : f64, ret : f64| Portfolio {
            weights : DVector::from_vec(vec![1.]),
            risk,
            expected_return : ret
        };
        let frontier = Frontier { portfolios : vec![port(0.1, 0.1), port(0.2, 0.15)], skipped : Vec::new() };
        let svg = frontier_chart(&frontier, &[port(0.3, 0.12)]).unwrap();
        assert_eq!(svg.matches("<circle").count(), 1);
        assert!(svg.contains("<polyline"));
        let empty = Frontier { portfolios : Vec::new(), skipped : Vec::new() };
        assert!(matches!(frontier_chart(&empty, &[]), Err(RenderError::NoData)));
    }

    #[test]
    fn allocation_chart_labels() {
        let alloc = Allocation::new(None, vec![0.25, 0.75], Some(0.0044)).unwrap();
        let svg = allocation_chart(&alloc).unwrap();
        assert!(svg.contains("C1 25.00%"));
        assert!(svg.contains("C2 75.00%"));
        assert!(svg.contains("Risk 0.0044"));
        assert_eq!(svg.matches("<path").count(), 2);
    }

    #[test]
    fn color_ramp_ends() {
        assert_eq!(ramp(0.), VIRIDIS[0]);
        assert_eq!(ramp(1.), VIRIDIS[4]);
        assert_eq!(escape("a<b & c"), "a&lt;b &amp; c");
    }

}
